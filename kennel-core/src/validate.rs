//! Record validation and normalization.
//!
//! Pure functions: a raw upstream entry goes in, a [`ValidRecord`] or a
//! [`Rejection`] comes out. Broken or unreachable images are a presentation
//! concern and never cause a rejection here.

use std::collections::HashSet;
use std::fmt;

use crate::{RawRecord, ValidRecord, NO_IMAGE};

/// Breeds longer than this are treated as corrupted payload spill-over.
pub const MAX_BREED_LEN: usize = 60;

/// Placeholder strings the upstream emits in place of real breed names.
/// Compared case-insensitively after trimming, and only as whole values.
///
/// This list is our own, on top of the length, URL and image-extension
/// checks applied to every breed. The short entries (`"na"`, `"-"`, `"?"`)
/// are wider than those checks and would reject a breed literally named so.
pub const BREED_SENTINELS: &[&str] = &[
    "null",
    "none",
    "nil",
    "undefined",
    "nan",
    "n/a",
    "na",
    "unknown",
    "error",
    "invalid",
    "corrupted",
    "placeholder",
    "todo",
    "tbd",
    "?",
    "-",
    "[object object]",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Why a raw record was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The entry is not a JSON object.
    NotAnObject,
    /// No `breed` field.
    MissingBreed,
    /// `breed` is present but not a string.
    BreedNotString,
    /// `breed` is empty after trimming.
    EmptyBreed,
    /// `breed` is a known placeholder/error string.
    Sentinel(String),
    /// `breed` looks like spilled-over payload (URL, file name, overlong).
    Corrupted(String),
    /// The same breed already appeared earlier in the page.
    Duplicate(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotAnObject => write!(f, "record is not an object"),
            Rejection::MissingBreed => write!(f, "breed is missing"),
            Rejection::BreedNotString => write!(f, "breed is not a string"),
            Rejection::EmptyBreed => write!(f, "breed is empty"),
            Rejection::Sentinel(s) => write!(f, "breed is a sentinel value: {s}"),
            Rejection::Corrupted(s) => write!(f, "breed looks corrupted: {s}"),
            Rejection::Duplicate(s) => write!(f, "duplicate breed in page: {s}"),
        }
    }
}

/// Validate and normalize one raw upstream record.
pub fn validate(raw: &RawRecord) -> Result<ValidRecord, Rejection> {
    let obj = raw.as_object().ok_or(Rejection::NotAnObject)?;

    let breed = match obj.get("breed") {
        None | Some(serde_json::Value::Null) => return Err(Rejection::MissingBreed),
        Some(serde_json::Value::String(s)) => s.trim(),
        Some(_) => return Err(Rejection::BreedNotString),
    };

    if breed.is_empty() {
        return Err(Rejection::EmptyBreed);
    }

    let lowered = breed.to_lowercase();
    if BREED_SENTINELS.contains(&lowered.as_str()) {
        return Err(Rejection::Sentinel(breed.to_string()));
    }

    if looks_corrupted(breed, &lowered) {
        return Err(Rejection::Corrupted(preview(breed)));
    }

    let image = match obj.get("image") {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        _ => NO_IMAGE.to_string(),
    };

    Ok(ValidRecord {
        breed: breed.to_string(),
        image,
    })
}

/// Result of validating a whole fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageValidation {
    /// Accepted records, in upstream order.
    pub accepted: Vec<ValidRecord>,
    pub rejected: Vec<Rejection>,
}

/// Validate every record of one page, dropping in-page duplicate breeds
/// (compared case-insensitively, first occurrence wins).
pub fn validate_page(raws: &[RawRecord]) -> PageValidation {
    let mut seen = HashSet::new();
    let mut result = PageValidation::default();

    for raw in raws {
        match validate(raw) {
            Ok(record) => {
                if seen.insert(record.breed.to_lowercase()) {
                    result.accepted.push(record);
                } else {
                    result.rejected.push(Rejection::Duplicate(record.breed));
                }
            }
            Err(rejection) => result.rejected.push(rejection),
        }
    }

    result
}

fn looks_corrupted(breed: &str, lowered: &str) -> bool {
    breed.chars().count() > MAX_BREED_LEN
        || lowered.contains("http://")
        || lowered.contains("https://")
        || IMAGE_EXTENSIONS.iter().any(|ext| lowered.contains(ext))
}

fn preview(s: &str) -> String {
    s.chars().take(80).collect()
}
