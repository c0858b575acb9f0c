use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_derive::{Deserialize, Serialize};

/// Named numeric lookup used by cuts and variables
pub trait Fields {
    fn field(&self, name: &str) -> Option<f64>;
}

/// Group a record's results are reported under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub event_type: String,
    pub attenuation: f64,
    pub scattering: f64
}

impl Category {
    pub fn new<S: Into<String>>(event_type: S, attenuation: f64, scattering: f64) -> Self {
        Category { event_type: event_type.into(), attenuation: attenuation, scattering: scattering }
    }

    /// Classifies a record from the file it was produced from.  Files of
    /// inverse beta decay events are `IBD`, everything else is `Background`.
    /// Unset optical parameters default to 1.
    pub fn from_source(source: &str, attenuation: Option<f64>, scattering: Option<f64>) -> Self {
        let event_type = if source.contains("IBD") { "IBD" } else { "Background" };
        Category::new(event_type, attenuation.unwrap_or(1.0), scattering.unwrap_or(1.0))
    }

    pub fn is_signal(&self) -> bool {
        self.event_type == "IBD"
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Category {}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        self.event_type.cmp(&other.event_type)
            .then_with(|| self.attenuation.total_cmp(&other.attenuation))
            .then_with(|| self.scattering.total_cmp(&other.scattering))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} attenuation={} scattering={}", self.event_type, self.attenuation, self.scattering)
    }
}

/// One reconstructed candidate within an event record.  `mcid` ties
/// candidates belonging to the same simulated event together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Candidate {
    pub mc_id: u64,
    pub values: BTreeMap<String, f64>
}

impl Candidate {
    pub fn new(mc_id: u64) -> Self {
        Candidate { mc_id: mc_id, values: BTreeMap::new() }
    }

    /// Builder-style setter
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_owned(), value);
        self
    }
}

impl Fields for Candidate {
    fn field(&self, name: &str) -> Option<f64> {
        match name {
            "mcid" => Some(self.mc_id as f64),
            _ => self.values.get(name).cloned()
        }
    }
}

/// Analysis record for a single simulated file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// File the record was converted from
    pub source: String,
    pub category: Category,
    /// Live time the record represents
    pub exposure: f64,
    pub candidates: Vec<Candidate>,
    /// Total PMT charge of each triggered entry
    pub total_charge: Vec<f64>,
    /// True energy of each triggered entry, aligned with `total_charge`
    #[serde(default)]
    pub mc_energy: Vec<f64>,
    /// Per-event sensitivity metric
    pub sensitivity: Vec<f64>
}

impl EventRecord {
    pub fn new<S: Into<String>>(source: S, category: Category, exposure: f64) -> Self {
        EventRecord {
            source: source.into(),
            category: category,
            exposure: exposure,
            candidates: Vec::new(),
            total_charge: Vec::new(),
            mc_energy: Vec::new(),
            sensitivity: Vec::new()
        }
    }
}

#[cfg(test)]
mod event_test {
    use super::*;

    #[test]
    fn test_category_from_source() {
        let c = Category::from_source("watchman_IBD_0001.root", Some(30.0), None);
        assert_eq!(c.event_type, "IBD");
        assert_eq!(c.attenuation, 30.0);
        assert_eq!(c.scattering, 1.0);
        assert!(c.is_signal());
        assert!(!Category::from_source("singles_Tl208.root", None, None).is_signal());
    }

    #[test]
    fn test_category_ordering() {
        let mut cats = vec![
            Category::new("IBD", 2.0, 1.0),
            Category::new("Background", 5.0, 1.0),
            Category::new("IBD", 0.5, 1.0),
            Category::new("IBD", 0.5, 0.5),
        ];
        cats.sort();
        assert_eq!(cats[0].event_type, "Background");
        assert_eq!((cats[1].attenuation, cats[1].scattering), (0.5, 0.5));
        assert_eq!((cats[2].attenuation, cats[2].scattering), (0.5, 1.0));
        assert_eq!(cats[3].attenuation, 2.0);
    }

    #[test]
    fn test_candidate_fields() {
        let c = Candidate::new(7).with("n9", 12.0);
        assert_eq!(c.field("mcid"), Some(7.0));
        assert_eq!(c.field("n9"), Some(12.0));
        assert_eq!(c.field("innerPE"), None);
    }
}
