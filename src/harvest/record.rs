//! Harvested record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields resolved from one item container on a results page
///
/// `name` and `url` are always present; the remaining fields are `None`
/// when no strategy produced a value. Absence is never replaced by a zero
/// or an empty string.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub name: String,
    /// Absolute product URL, also the storage identity key
    pub url: String,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
}

impl Listing {
    /// Stamps the listing with its category and observation time
    pub fn into_record(self, category: &str, observed_at: DateTime<Utc>) -> Record {
        Record {
            name: self.name,
            url: self.url,
            price: self.price,
            rating: self.rating,
            review_count: self.review_count,
            category: category.to_string(),
            observed_at,
        }
    }
}

/// A product record ready for storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub url: String,
    pub price: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub category: String,
    pub observed_at: DateTime<Utc>,
}
