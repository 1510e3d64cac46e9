//! Cached record and page structures

use crate::{PageNumber, RawRecord, Timestamp, NO_IMAGE, PAGE_SIZE};
use serde::{Deserialize, Serialize};

/// A record that passed validation.
///
/// `breed` is never empty and never a corruption sentinel. `image` may be
/// [`NO_IMAGE`], which tells the presentation layer to use its fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidRecord {
    pub breed: String,
    pub image: String,
}

impl ValidRecord {
    /// Whether an image URL is present.
    pub fn has_image(&self) -> bool {
        self.image != NO_IMAGE
    }

    /// Render back into the upstream's wire shape.
    pub fn to_raw(&self) -> RawRecord {
        serde_json::json!({
            "breed": self.breed,
            "image": self.image,
        })
    }
}

/// One cached page: an ordered batch of at most [`PAGE_SIZE`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub number: PageNumber,
    pub records: Vec<ValidRecord>,
    /// When this content was last accepted from the upstream.
    /// `None` only for the empty placeholder of a never-populated page.
    pub refreshed_at: Option<Timestamp>,
}

impl Page {
    /// Build a populated page. Records past [`PAGE_SIZE`] are dropped.
    pub fn new(number: PageNumber, mut records: Vec<ValidRecord>, refreshed_at: Timestamp) -> Self {
        records.truncate(PAGE_SIZE);
        Self {
            number,
            records,
            refreshed_at: Some(refreshed_at),
        }
    }

    /// Placeholder returned to readers for a page that was never populated.
    pub fn empty(number: PageNumber) -> Self {
        Self {
            number,
            records: Vec::new(),
            refreshed_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Aggregate metadata over the whole cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Highest page number ever observed with at least one valid record.
    /// Never decreases.
    pub total_pages: PageNumber,
    pub total_records: u64,
    /// Most recent refresh across all pages.
    pub last_refresh_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(breed: &str) -> ValidRecord {
        ValidRecord {
            breed: breed.to_string(),
            image: NO_IMAGE.to_string(),
        }
    }

    #[test]
    fn test_page_truncates_to_page_size() {
        let records: Vec<_> = (0..20).map(|i| record(&format!("breed-{i}"))).collect();
        let page = Page::new(1, records, Utc::now());
        assert_eq!(page.len(), PAGE_SIZE);
        assert_eq!(page.records[14].breed, "breed-14");
    }

    #[test]
    fn test_empty_page_has_no_refresh_time() {
        let page = Page::empty(4);
        assert!(page.is_empty());
        assert_eq!(page.number, 4);
        assert!(page.refreshed_at.is_none());
    }

    #[test]
    fn test_has_image() {
        let mut r = record("Beagle");
        assert!(!r.has_image());
        r.image = "https://images.example/beagle.jpg".to_string();
        assert!(r.has_image());
    }

    #[test]
    fn test_to_raw_matches_wire_shape() {
        let r = ValidRecord {
            breed: "Boxer".to_string(),
            image: "https://images.example/boxer.png".to_string(),
        };
        let raw = r.to_raw();
        assert_eq!(raw["breed"], "Boxer");
        assert_eq!(raw["image"], "https://images.example/boxer.png");
    }
}
