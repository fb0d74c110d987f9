use serde::{Deserialize, Serialize};

use crate::registry::PageRecord;

/// One extracted page, as written to `pages.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub id: String,
    pub url: String,
    pub serial: Option<u32>,
    pub title: Option<String>,
    pub html: String,
    pub retrieved_at: String,
}

/// One registry record, as written to `toc.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl From<PageRecord> for TocEntry {
    fn from(record: PageRecord) -> Self {
        Self {
            url: record.url,
            serial: record.serial,
            title: record.title,
            depth: record.depth,
        }
    }
}

pub fn page_id_from_url(url: &str) -> String {
    let mut hasher = sha2::Sha256::new();
    use sha2::Digest as _;
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    format!("p_{}", hex::encode(digest))
}
