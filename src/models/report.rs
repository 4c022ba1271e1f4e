use std::fmt;

/// Which stage of a synchronization pass produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    Update,
    Casing,
    ModLink,
    KeyLink,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::Update => "update",
            SyncStep::Casing => "casing",
            SyncStep::ModLink => "mod-link",
            SyncStep::KeyLink => "key-link",
        };
        f.write_str(name)
    }
}

/// Outcome of one step for one mod (or one path, for casing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModStatus {
    /// Something on disk was created, replaced, renamed or removed
    Changed,
    /// Already in the desired state
    Unchanged,
    /// Not acted on because a precondition is missing (mod folder, key folder, changelog)
    Skipped,
    /// Network or download problem; a later run may succeed
    TransientFailure,
    /// Local problem a rerun will not fix on its own
    PermanentFailure,
}

impl ModStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, ModStatus::TransientFailure | ModStatus::PermanentFailure)
    }
}

/// Result of a single synchronization step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModResult {
    /// Mod name, key file name or workshop path the result is about
    pub subject: String,
    pub step: SyncStep,
    pub status: ModStatus,
    pub message: String,
}

impl ModResult {
    pub fn new(
        subject: impl Into<String>,
        step: SyncStep,
        status: ModStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            step,
            status,
            message: message.into(),
        }
    }
}

/// Everything a synchronization pass did, in execution order
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub results: Vec<ModResult>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = ModResult>) {
        self.results.extend(results);
    }

    pub fn failures(&self) -> impl Iterator<Item = &ModResult> {
        self.results.iter().filter(|r| r.status.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn count(&self, status: ModStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Results for one step only
    pub fn for_step(&self, step: SyncStep) -> impl Iterator<Item = &ModResult> {
        self.results.iter().filter(move |r| r.step == step)
    }

    /// Get a summary string of the pass
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        let changed = self.count(ModStatus::Changed);
        let skipped = self.count(ModStatus::Skipped);
        let transient = self.count(ModStatus::TransientFailure);
        let permanent = self.count(ModStatus::PermanentFailure);

        if changed > 0 {
            parts.push(format!("{} changed", changed));
        }
        if skipped > 0 {
            parts.push(format!("{} skipped", skipped));
        }
        if transient > 0 {
            parts.push(format!("{} transient failures", transient));
        }
        if permanent > 0 {
            parts.push(format!("{} permanent failures", permanent));
        }

        if parts.is_empty() {
            "Nothing to do".to_string()
        } else {
            parts.join(", ")
        }
    }
}
