//! # Statistics
//!
//! Dashboard metrics computed in memory over a fully fetched villa set. The
//! backend offers row filters only, no aggregate queries.

use serde::ser::{Serialize, SerializeMap, Serializer};
use vm_core::models::Villa;

pub const UNKNOWN_LOCATION: &str = "Unknown";
pub const UNKNOWN_STATUS: &str = "unknown";

/// Counts per key, kept in first-seen order. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    buckets: Vec<(String, usize)>,
}

impl Tally {
    pub fn increment(&mut self, key: &str) {
        match self.buckets.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count += 1,
            None => self.buckets.push((key.to_string(), 1)),
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.buckets
            .iter()
            .find(|(k, _)| k == key)
            .map_or(0, |(_, count)| *count)
    }

    /// Sum over all buckets.
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|(_, count)| count).sum()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.buckets.first().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.buckets.iter().map(|(k, c)| (k.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.buckets.len()))?;
        for (key, count) in &self.buckets {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VillaStats {
    pub total_count: usize,
    pub total_fee_revenue: f64,
    pub average_monthly_price: f64,
    pub count_by_location: Tally,
    pub count_by_status: Tally,
}

impl VillaStats {
    /// The location listed first, shown as the dashboard's "top location".
    pub fn top_location(&self) -> Option<&str> {
        self.count_by_location.first_key()
    }
}

/// Summarizes `villas`. Absent fees and prices count as 0, absent locations
/// and statuses fall into the "Unknown"/"unknown" buckets.
pub fn summarize(villas: &[Villa]) -> VillaStats {
    let total_count = villas.len();
    let total_fee_revenue = villas.iter().map(|v| v.agent_fee.unwrap_or(0.0)).sum();
    let average_monthly_price = if total_count == 0 {
        0.0
    } else {
        villas
            .iter()
            .map(|v| v.monthly_price.unwrap_or(0.0))
            .sum::<f64>()
            / total_count as f64
    };

    VillaStats {
        total_count,
        total_fee_revenue,
        average_monthly_price,
        count_by_location: group_by_location(villas),
        count_by_status: group_by_status(villas),
    }
}

pub fn group_by_location(villas: &[Villa]) -> Tally {
    let mut tally = Tally::default();
    for villa in villas {
        let location = villa.location.trim();
        tally.increment(if location.is_empty() { UNKNOWN_LOCATION } else { location });
    }
    tally
}

pub fn group_by_status(villas: &[Villa]) -> Tally {
    let mut tally = Tally::default();
    for villa in villas {
        tally.increment(villa.status.map_or(UNKNOWN_STATUS, |s| s.as_str()));
    }
    tally
}
