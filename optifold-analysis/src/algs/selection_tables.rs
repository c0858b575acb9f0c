use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

use optifold::BoxError;

use crate::algorithm::Algorithm;
use crate::event::EventRecord;
use crate::selection::{Selection, SelectionDefs};
use crate::stats::CategorySelectionStats;

use super::write_report;

/// Per-category cut flow of every standard selection, weighted by exposure.
/// `finish` writes `selectiontables/<selection>.txt` under the output directory.
#[derive(Debug, Clone)]
pub struct SelectionTables {
    output: PathBuf,
    selections: Vec<Selection>
}

impl SelectionTables {
    pub fn new(output: &Path) -> Self {
        SelectionTables { output: output.to_path_buf(), selections: SelectionDefs::all() }
    }
}

impl Algorithm<EventRecord> for SelectionTables {
    /// Keyed by selection name
    type Partial = BTreeMap<String, CategorySelectionStats>;
    type Output = BTreeMap<String, CategorySelectionStats>;

    fn key(&self) -> Option<String> {
        Some("SelectionTables".into())
    }

    fn apply(&self, record: &EventRecord) -> Result<Self::Partial, BoxError> {
        Ok(self.selections.iter().map(|selection| {
            let mut stats = CategorySelectionStats::new(selection.clone());
            stats.fill(&record.category, &record.candidates, record.exposure);
            (selection.name.clone(), stats)
        }).collect())
    }

    fn finish(&self, stats: Self::Partial) -> Result<Self::Output, BoxError> {
        for (name, s) in stats.iter() {
            let path = self.output.join("selectiontables").join(format!("{}.txt", name));
            write_report(&path, &s.table()?)?;
            debug!("Wrote {}", path.display());
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod selection_tables_test {
    use super::*;
    use crate::algorithm::boxed;
    use crate::dataset::Dataset;
    use crate::event::{Candidate, Category};
    use crate::reduce::reduce;
    use optifold::scheduler::GreedyScheduler;

    fn record(event_type: &str, exposure: f64) -> EventRecord {
        let mut r = EventRecord::new("test.root", Category::new(event_type, 1.0, 1.0), exposure);
        r.candidates = vec![
            Candidate::new(1).with("closestPMT", 2000.0).with("good_pos", 0.5),
            Candidate::new(2).with("closestPMT", 100.0).with("good_pos", 0.5)
        ];
        r
    }

    #[test]
    fn test_tables_accumulate_exposure() {
        let dir = tempfile::tempdir().unwrap();
        let records = Dataset::from_partitions(vec![
            vec![record("IBD", 1.0), record("Background", 2.0)],
            vec![record("IBD", 3.0)]
        ]);
        let out = reduce(&[boxed(SelectionTables::new(dir.path()))], &records, &GreedyScheduler::new(2)).unwrap();
        let stats = out.into_iter().next().unwrap()
            .downcast::<BTreeMap<String, CategorySelectionStats>>().unwrap();

        let nominal = &stats["nominal"];
        assert_eq!(nominal.len(), 2);
        let ibd = nominal.get(&Category::new("IBD", 1.0, 1.0)).unwrap();
        let fiducial = ibd.items().next().unwrap();
        assert_eq!(fiducial.individual.total, 8.0);
        assert_eq!(fiducial.individual.passed, 4.0);

        let all = &stats["noselection"].total().unwrap();
        assert_eq!(all.items().next().unwrap().cumulative.passed, 12.0);

        assert!(dir.path().join("selectiontables/nominal.txt").exists());
        assert!(dir.path().join("selectiontables/noselection.txt").exists());
    }
}
