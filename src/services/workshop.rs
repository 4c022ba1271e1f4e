//! Scraping of Steam Workshop pages.
//!
//! Steam offers no public API for an item's changelog, so the last update time
//! and the display title are pulled out of the HTML with fixed patterns. When
//! Steam changes its markup the parsers return `None` rather than an error.

use crate::models::WorkshopId;
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::time::Duration;
use thiserror::Error;

pub const WORKSHOP_CHANGELOG_URL: &str = "https://steamcommunity.com/sharedfiles/filedetails/changelog";
pub const WORKSHOP_DETAILS_URL: &str = "https://steamcommunity.com/sharedfiles/filedetails/";

#[derive(Error, Debug)]
pub enum WorkshopError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Read access to the Workshop pages of an item
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkshopClient: Send + Sync {
    /// Unix timestamp of the newest changelog entry, `None` if the page has none we recognise
    async fn latest_update(&self, id: WorkshopId) -> Result<Option<i64>, WorkshopError>;

    /// Human readable item title, `None` if the page has none we recognise
    async fn title(&self, id: WorkshopId) -> Result<Option<String>, WorkshopError>;
}

/// Compiled patterns for the Workshop HTML pages
#[derive(Debug, Clone)]
pub struct WorkshopPageParser {
    /// Newest changelog entry: `<div class="workshopAnnouncement"> ... <p id="1700000000">`
    update_pattern: Regex,

    /// Item title: `<div class="workshopItemTitle">CBA_A3</div>`
    title_pattern: Regex,

    /// Character references in page text: `&amp;`, `&#39;`, `&#x27;`
    entity_pattern: Regex,
}

impl WorkshopPageParser {
    pub fn new() -> Self {
        Self {
            update_pattern: Regex::new(r#"(?s)workshopAnnouncement.*?<p id="(\d+)">"#)
                .expect("Invalid update regex"),
            title_pattern: Regex::new(r#"(?s)<div class="workshopItemTitle">(.*?)</div>"#)
                .expect("Invalid title regex"),
            entity_pattern: Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);")
                .expect("Invalid entity regex"),
        }
    }

    pub fn parse_update_timestamp(&self, html: &str) -> Option<i64> {
        self.update_pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Item title as plain text, with character references decoded
    pub fn parse_title(&self, html: &str) -> Option<String> {
        self.title_pattern
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| self.decode_entities(m.as_str().trim()))
            .filter(|title| !title.is_empty())
    }

    /// Decode HTML character references; unknown named references are kept as written
    pub fn decode_entities(&self, text: &str) -> String {
        self.entity_pattern
            .replace_all(text, |caps: &Captures| {
                let entity = &caps[1];
                let decoded = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok().and_then(char::from_u32)
                } else {
                    match entity {
                        "amp" => Some('&'),
                        "lt" => Some('<'),
                        "gt" => Some('>'),
                        "quot" => Some('"'),
                        "apos" => Some('\''),
                        "nbsp" => Some('\u{a0}'),
                        _ => None,
                    }
                };
                decoded.map_or_else(|| caps[0].to_string(), String::from)
            })
            .into_owned()
    }
}

impl Default for WorkshopPageParser {
    fn default() -> Self {
        Self::new()
    }
}

/// [`WorkshopClient`] talking to steamcommunity.com
#[derive(Debug, Clone)]
pub struct SteamWorkshopClient {
    client: reqwest::Client,
    parser: WorkshopPageParser,
    changelog_url: String,
    details_url: String,
}

impl SteamWorkshopClient {
    pub fn new(timeout: Duration) -> Result<Self, WorkshopError> {
        Self::with_urls(timeout, WORKSHOP_CHANGELOG_URL, WORKSHOP_DETAILS_URL)
    }

    /// Point the client at other base URLs (mirrors, local test servers)
    pub fn with_urls(
        timeout: Duration,
        changelog_url: impl Into<String>,
        details_url: impl Into<String>,
    ) -> Result<Self, WorkshopError> {
        let changelog_url = changelog_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("a3modman/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| WorkshopError::Request {
                url: changelog_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            parser: WorkshopPageParser::new(),
            changelog_url,
            details_url: details_url.into(),
        })
    }

    pub fn changelog_url(&self, id: WorkshopId) -> String {
        format!("{}/{}", self.changelog_url.trim_end_matches('/'), id)
    }

    pub fn details_url(&self, id: WorkshopId) -> String {
        format!("{}?id={}", self.details_url, id)
    }

    async fn fetch(&self, url: String) -> Result<String, WorkshopError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| WorkshopError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkshopError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| WorkshopError::Request { url, source })
    }
}

#[async_trait]
impl WorkshopClient for SteamWorkshopClient {
    async fn latest_update(&self, id: WorkshopId) -> Result<Option<i64>, WorkshopError> {
        let html = self.fetch(self.changelog_url(id)).await?;
        Ok(self.parser.parse_update_timestamp(&html))
    }

    async fn title(&self, id: WorkshopId) -> Result<Option<String>, WorkshopError> {
        let html = self.fetch(self.details_url(id)).await?;
        Ok(self.parser.parse_title(&html))
    }
}
