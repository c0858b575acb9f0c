//! Reference algorithms over `EventRecord`s

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::event::Candidate;

mod basic_hist;
mod noop;
mod resolution;
mod selection_tables;
mod timestamp;

pub use self::basic_hist::{BasicHist, BasicHistResult};
pub use self::noop::Noop;
pub use self::resolution::{Resolution, ResolutionResult};
pub use self::selection_tables::SelectionTables;
pub use self::timestamp::Timestamp;

/// Every candidate, then the first and the second of each simulated event
const SUBEVENTS: [Option<usize>; 3] = [None, Some(0), Some(1)];

// Creates parent directories as needed
fn write_report(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn subevent_label(subevent: Option<usize>) -> String {
    match subevent {
        Some(n) => format!("subevent{}", n),
        None => "subeventall".to_owned()
    }
}

/// Keeps the `n`th candidate of each simulated event, in their original
/// order.  `None` keeps every candidate.
fn nth_in_event<'a>(rows: &[&'a Candidate], n: Option<usize>) -> Vec<&'a Candidate> {
    match n {
        None => rows.to_vec(),
        Some(n) => {
            let mut seen: BTreeMap<u64, usize> = BTreeMap::new();
            rows.iter().cloned().filter(|c| {
                let count = seen.entry(c.mc_id).or_insert(0);
                *count += 1;
                *count == n + 1
            }).collect()
        }
    }
}
