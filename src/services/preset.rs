//! Arma 3 Launcher preset generation.
//!
//! A preset is an HTML page the launcher can import (Mods → Preset → Import)
//! to subscribe a client to exactly the server's mod list.

use crate::models::{DlcEntry, ModSet, ModpackConfig, WorkshopId};
use crate::services::workshop::WorkshopClient;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::fs;
use std::io;
use tera::{Context, Tera};
use thiserror::Error;

pub const WORKSHOP_ITEM_URL: &str = "http://steamcommunity.com/sharedfiles/filedetails/?id=";
pub const STORE_APP_URL: &str = "https://store.steampowered.com/app/";

const PRESET_TEMPLATE: &str = include_str!("templates/preset.html.tera");

#[derive(Error, Debug)]
pub enum PresetError {
    #[error("failed to write preset {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to render preset: {0}")]
    Render(#[from] tera::Error),
}

/// One row of a preset table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetEntry {
    pub title: String,
    pub url: String,
}

/// A launcher preset ready to be rendered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preset {
    pub name: String,
    pub required: Vec<PresetEntry>,
    pub optional: Vec<PresetEntry>,
    pub dlc: Vec<PresetEntry>,
}

/// Split a mod set into the mods every client needs and the optional ones.
///
/// Server-only mods appear in neither list.
pub fn split_mods(mods: &ModSet, modpack: &ModpackConfig) -> (ModSet, ModSet) {
    let mut required = ModSet::new();
    let mut optional = ModSet::new();

    for (name, id) in mods {
        if modpack.optional_mods.contains(name) {
            optional.insert(name.clone(), *id);
        } else if !modpack.server_mods.contains(name) {
            required.insert(name.clone(), *id);
        }
    }

    (required, optional)
}

/// Look up Workshop titles for each mod.
///
/// Mods without a resolvable title are left out of the preset, with a warning.
pub async fn resolve_entries(mods: &ModSet, workshop: &dyn WorkshopClient) -> Vec<PresetEntry> {
    let mut entries = Vec::with_capacity(mods.len());

    for (name, id) in mods {
        match workshop.title(*id).await {
            Ok(Some(title)) => entries.push(PresetEntry {
                title,
                url: workshop_item_url(*id),
            }),
            Ok(None) => tracing::warn!("No title found for mod '{}' ({}), leaving it out", name, id),
            Err(e) => tracing::warn!("Title lookup for mod '{}' ({}) failed: {}", name, id, e),
        }
    }

    entries
}

pub fn dlc_entries(dlc: &[DlcEntry]) -> Vec<PresetEntry> {
    dlc.iter()
        .map(|entry| PresetEntry {
            title: entry.name.clone(),
            url: format!("{}{}", STORE_APP_URL, entry.app_id),
        })
        .collect()
}

pub fn workshop_item_url(id: WorkshopId) -> String {
    format!("{}{}", WORKSHOP_ITEM_URL, id)
}

/// Build the preset for the configured modpack
pub async fn build_preset(
    mods: &ModSet,
    modpack: &ModpackConfig,
    workshop: &dyn WorkshopClient,
) -> Preset {
    let (required, optional) = split_mods(mods, modpack);

    Preset {
        name: modpack.name.clone(),
        required: resolve_entries(&required, workshop).await,
        optional: resolve_entries(&optional, workshop).await,
        dlc: dlc_entries(&modpack.dlc),
    }
}

impl Preset {
    /// Render the launcher HTML; titles and the preset name are escaped by the template engine
    pub fn render(&self) -> Result<String, PresetError> {
        let mut tera = Tera::default();
        // The .html suffix turns on autoescape
        tera.add_raw_template("preset.html", PRESET_TEMPLATE)?;

        let mut context = Context::from_serialize(self)?;
        context.insert("version", env!("CARGO_PKG_VERSION"));

        Ok(tera.render("preset.html", &context)?)
    }

    pub fn write_to(&self, path: &Utf8Path) -> Result<(), PresetError> {
        let html = self.render()?;
        fs::write(path, html).map_err(|source| PresetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            "Wrote preset '{}' with {} required and {} optional mods to {}",
            self.name,
            self.required.len(),
            self.optional.len(),
            path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::workshop::{MockWorkshopClient, WorkshopError, WorkshopPageParser};

    fn modpack() -> ModpackConfig {
        let mut modpack = ModpackConfig::default();
        modpack.name = "Ops Night".to_string();
        modpack.server_mods.insert("@blastcore_server".to_string());
        modpack.optional_mods.insert("@blastcore".to_string());
        modpack.dlc.push(DlcEntry {
            name: "Global Mobilization".to_string(),
            app_id: WorkshopId::new(1042220),
        });
        modpack
    }

    fn mods() -> ModSet {
        let mut mods = ModSet::new();
        mods.insert("@cba_a3".to_string(), WorkshopId::new(450814997));
        mods.insert("@blastcore".to_string(), WorkshopId::new(767380317));
        mods.insert("@blastcore_server".to_string(), WorkshopId::new(1));
        mods
    }

    #[test]
    fn test_split_mods() {
        let (required, optional) = split_mods(&mods(), &modpack());
        assert_eq!(required.keys().collect::<Vec<_>>(), vec!["@cba_a3"]);
        assert_eq!(optional.keys().collect::<Vec<_>>(), vec!["@blastcore"]);
    }

    #[tokio::test]
    async fn test_build_preset_skips_unresolved_titles() {
        let mut workshop = MockWorkshopClient::new();
        workshop.expect_title().returning(|id| match id.get() {
            450814997 => Ok(Some("CBA_A3".to_string())),
            _ => Err(WorkshopError::Status {
                url: "https://example.invalid".to_string(),
                status: 500,
            }),
        });

        let preset = build_preset(&mods(), &modpack(), &workshop).await;

        assert_eq!(preset.name, "Ops Night");
        assert_eq!(preset.required.len(), 1);
        assert_eq!(preset.required[0].title, "CBA_A3");
        assert!(preset.optional.is_empty());
        assert_eq!(preset.dlc[0].url, "https://store.steampowered.com/app/1042220");
    }

    #[test]
    fn test_render_escapes_titles() {
        let preset = Preset {
            name: "Ops & Night".to_string(),
            required: vec![PresetEntry {
                title: "<script>".to_string(),
                url: workshop_item_url(WorkshopId::new(1)),
            }],
            ..Preset::default()
        };

        let html = preset.render().unwrap();
        assert!(html.contains("content=\"Ops &amp; Night\""));
        assert!(html.contains("<strong>Ops &amp; Night</strong>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("data-type=\"ModContainer\""));
        assert!(!html.contains("Optional Mods"));
        assert!(!html.contains("DlcContainer"));
    }

    #[test]
    fn test_render_keeps_links_verbatim() {
        let preset = Preset {
            name: "Ops Night".to_string(),
            required: vec![PresetEntry {
                title: "CBA_A3".to_string(),
                url: workshop_item_url(WorkshopId::new(450814997)),
            }],
            optional: vec![PresetEntry {
                title: "Blastcore".to_string(),
                url: workshop_item_url(WorkshopId::new(767380317)),
            }],
            dlc: dlc_entries(&modpack().dlc),
        };

        let html = preset.render().unwrap();
        assert!(html.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(html.contains(
            "<a href=\"http://steamcommunity.com/sharedfiles/filedetails/?id=450814997\" data-type=\"Link\">"
        ));
        assert!(html.contains("data-type=\"OptionalContainer\""));
        assert!(html.contains("<a href=\"https://store.steampowered.com/app/1042220\" data-type=\"Link\">"));
        assert!(html.contains(&format!("content=\"a3modman {}\"", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn test_scraped_title_is_escaped_once() {
        let parser = WorkshopPageParser::new();
        let page = "<div class=\"workshopItemTitle\">ACE3 &amp; CBA &lt;Compat&gt;</div>";
        let title = parser.parse_title(page).unwrap();

        let preset = Preset {
            name: "Ops Night".to_string(),
            required: vec![PresetEntry {
                title,
                url: workshop_item_url(WorkshopId::new(463939057)),
            }],
            ..Preset::default()
        };

        let html = preset.render().unwrap();
        assert!(html.contains("<td data-type=\"DisplayName\">ACE3 &amp; CBA &lt;Compat&gt;</td>"));
        assert!(!html.contains("&amp;amp;"));
        assert!(!html.contains("&amp;lt;"));
    }
}
