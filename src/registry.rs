use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// What the crawl knows about one URL.
///
/// `title` and `serial` are owned by catalog discovery, `depth` by page
/// visits. Neither writer touches the other's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub serial: Option<u32>,
    pub depth: Option<u32>,
}

impl PageRecord {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            title: None,
            serial: None,
            depth: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PageRegistry {
    records: DashMap<String, PageRecord>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the depth observed when `url` is visited.
    pub fn upsert_depth(&self, url: &str, depth: u32) {
        self.records
            .entry(url.to_owned())
            .and_modify(|record| record.depth = Some(depth))
            .or_insert_with(|| PageRecord {
                depth: Some(depth),
                ..PageRecord::new(url)
            });
    }

    /// Records the title and catalog position of `url`.
    pub fn upsert_catalog_entry(&self, url: &str, title: &str, serial: u32) {
        self.records
            .entry(url.to_owned())
            .and_modify(|record| {
                record.title = Some(title.to_owned());
                record.serial = Some(serial);
            })
            .or_insert_with(|| PageRecord {
                title: Some(title.to_owned()),
                serial: Some(serial),
                ..PageRecord::new(url)
            });
    }

    pub fn get(&self, url: &str) -> Option<PageRecord> {
        self.records.get(url).map(|record| record.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in book order: unnumbered pages (the landing page)
    /// first, then by serial, ties broken by URL.
    pub fn snapshot(&self) -> Vec<PageRecord> {
        let mut records = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        records.sort_by(|a, b| (a.serial, &a.url).cmp(&(b.serial, &b.url)));
        records
    }
}
