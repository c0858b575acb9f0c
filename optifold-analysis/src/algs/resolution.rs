use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde_derive::{Deserialize, Serialize};
use tabled::{Table, Tabled};

use optifold::BoxError;

use crate::algorithm::Algorithm;
use crate::combine::Combine;
use crate::error::Result;
use crate::event::{Category, EventRecord};
use crate::hist::{Axis, ExposureWeightedHistogram, Histogram};
use crate::selection::{Selection, SelectionDefs};
use crate::variable::{Variable, VariableDefs};

use super::{nth_in_event, subevent_label, write_report, SUBEVENTS};

const CANDIDATE_VARIABLES: [&str; 2] = ["innerPE_over_mcenergy", "deltar"];

/// Quantity taken from the record as a whole rather than from its candidates
struct RecordVariable {
    name: &'static str,
    axis: Axis,
    values: fn(&EventRecord) -> Vec<f64>
}

fn total_charge(record: &EventRecord) -> Vec<f64> {
    record.total_charge.clone()
}

// Entries without a positive true energy are skipped
fn total_charge_over_energy(record: &EventRecord) -> Vec<f64> {
    record.total_charge.iter().zip(record.mc_energy.iter())
        .filter(|(_, e)| **e > 0.0)
        .map(|(q, e)| q / e)
        .collect()
}

fn record_variables() -> Vec<RecordVariable> {
    vec![
        RecordVariable { name: "totalcharge", axis: Axis::regular(300, 0.0, 150.0), values: total_charge },
        RecordVariable { name: "totalcharge_over_mcenergy", axis: Axis::regular(200, 0.0, 50.0), values: total_charge_over_energy }
    ]
}

/// Histograms keyed by `<variable>_<selection>_<subevent>`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub hist: BTreeMap<String, ExposureWeightedHistogram>
}

impl Combine for ResolutionResult {
    fn combine(&self, other: &Self) -> Result<Self> {
        Ok(ResolutionResult { hist: self.hist.combine(&other.hist)? })
    }
}

/// Energy and position resolution.  Candidate variables are histogrammed
/// under each selection and subevent.  Record variables are filled for
/// every combination unchanged, so every key has a full set of tables.
///
/// `finish` writes the binned mean and width of each category to
/// `resolution/<key>.txt`, and a signal-only summary of the first
/// subevent to `resolution/summary/<variable>_<selection>.txt`.
#[derive(Debug, Clone)]
pub struct Resolution {
    output: PathBuf,
    selections: Vec<Selection>,
    variables: Vec<Variable>
}

impl Resolution {
    pub fn new(output: &Path) -> Self {
        Resolution {
            output: output.to_path_buf(),
            selections: SelectionDefs::all(),
            variables: VariableDefs::all().into_iter()
                .filter(|v| CANDIDATE_VARIABLES.contains(&v.name.as_str()))
                .collect()
        }
    }

    fn write_tables(&self, key: &str, hist: &ExposureWeightedHistogram) -> Result<()> {
        let rows = hist.items().map(|item| resolution_row(item.category, &item.histogram));
        let path = self.output.join("resolution").join(format!("{}.txt", key));
        write_report(&path, &Table::new(rows).to_string())?;
        Ok(())
    }

    fn write_summary(&self, name: &str, hist: &ExposureWeightedHistogram) -> Result<()> {
        let rows = hist.items()
            .filter(|item| item.category.is_signal())
            .map(|item| resolution_row(item.category, &item.histogram));
        let path = self.output.join("resolution").join("summary").join(format!("{}.txt", name));
        write_report(&path, &Table::new(rows).to_string())?;
        Ok(())
    }
}

fn fill(result: &mut ResolutionResult, key: String, axis: Axis, record: &EventRecord, values: &[f64]) {
    result.hist.entry(key)
        .or_insert_with(|| ExposureWeightedHistogram::new(axis))
        .fill(&record.category, record.exposure, values, None);
}

impl Algorithm<EventRecord> for Resolution {
    type Partial = ResolutionResult;
    type Output = ResolutionResult;

    fn key(&self) -> Option<String> {
        Some("Resolution".into())
    }

    fn apply(&self, record: &EventRecord) -> std::result::Result<ResolutionResult, BoxError> {
        let mut result = ResolutionResult::default();
        let whole: Vec<(RecordVariable, Vec<f64>)> = record_variables().into_iter()
            .map(|v| {
                let values = (v.values)(record);
                (v, values)
            })
            .collect();

        for selection in self.selections.iter() {
            let selected = selection.select(&record.candidates);
            for subevent in SUBEVENTS.iter() {
                let label = subevent_label(*subevent);
                let rows = nth_in_event(&selected, *subevent);
                for variable in self.variables.iter() {
                    let key = format!("{}_{}_{}", variable.name, selection.name, label);
                    fill(&mut result, key, variable.axis, record, &variable.values(&rows));
                }
                for (variable, values) in whole.iter() {
                    let key = format!("{}_{}_{}", variable.name, selection.name, label);
                    fill(&mut result, key, variable.axis, record, values);
                }
            }
        }
        Ok(result)
    }

    fn finish(&self, result: ResolutionResult) -> std::result::Result<ResolutionResult, BoxError> {
        let summary_suffix = format!("_{}", subevent_label(Some(0)));
        for (key, hist) in result.hist.iter() {
            self.write_tables(key, hist)?;
            if let Some(name) = key.strip_suffix(&summary_suffix) {
                self.write_summary(name, hist)?;
            }
        }
        debug!("Wrote resolution tables for {} histograms", result.hist.len());
        Ok(result)
    }
}

#[derive(Tabled)]
struct ResolutionRow {
    #[tabled(rename = "Event Type")]
    event_type: String,
    #[tabled(rename = "Attenuation")]
    attenuation: f64,
    #[tabled(rename = "Scattering")]
    scattering: f64,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Mean Error")]
    mean_error: String,
    #[tabled(rename = "Std. Dev.")]
    std_dev: String,
    #[tabled(rename = "Std. Dev. Error")]
    std_dev_error: String
}

// Errors are the large-sample estimates from the effective entry count
fn resolution_row(category: &Category, hist: &Histogram) -> ResolutionRow {
    let n = hist.effective_entries();
    let sigma = hist.std_dev();
    let mean_error = if n > 0.0 { sigma / n.sqrt() } else { f64::NAN };
    let sigma_error = if n > 1.0 { sigma / (2.0 * (n - 1.0)).sqrt() } else { f64::NAN };
    ResolutionRow {
        event_type: category.event_type.clone(),
        attenuation: category.attenuation,
        scattering: category.scattering,
        mean: format!("{:.6}", hist.mean()),
        mean_error: format!("{:.6}", mean_error),
        std_dev: format!("{:.6}", sigma),
        std_dev_error: format!("{:.6}", sigma_error)
    }
}

#[cfg(test)]
mod resolution_test {
    use super::*;
    use std::fs;

    use optifold::scheduler::SyncScheduler;

    use crate::algorithm::boxed;
    use crate::dataset::Dataset;
    use crate::event::Candidate;
    use crate::reduce::reduce;

    fn candidate(mc_id: u64, energy: f64, inner_pe: f64) -> Candidate {
        Candidate::new(mc_id)
            .with("closestPMT", 2000.0)
            .with("good_pos", 0.5)
            .with("inner_hit", 10.0)
            .with("veto_hit", 0.0)
            .with("t", 0.0)
            .with("innerPE", inner_pe)
            .with("mc_energy", energy)
            .with("x", 3.0).with("mcx", 0.0)
            .with("y", 4.0).with("mcy", 0.0)
            .with("z", 0.0).with("mcz", 0.0)
    }

    fn record(event_type: &str, attenuation: f64) -> EventRecord {
        let mut r = EventRecord::new("test.root", Category::new(event_type, attenuation, 1.0), 1.0);
        r.candidates = vec![candidate(1, 2.0, 20.0), candidate(2, 2.0, 40.0)];
        r.total_charge = vec![10.0, 20.0, 30.0];
        r.mc_energy = vec![2.0, 0.0, 3.0];
        r
    }

    fn total(result: &ResolutionResult, key: &str) -> f64 {
        result.hist[key].items().map(|item| item.histogram.total()).sum()
    }

    #[test]
    fn test_apply_fills_every_key() {
        let alg = Resolution::new(Path::new("unused"));
        let result = alg.apply(&record("IBD", 1.0)).unwrap();
        assert_eq!(result.hist.len(), SelectionDefs::all().len() * 3 * 4);

        assert_eq!(total(&result, "deltar_noselection_subeventall"), 2.0);
        assert_eq!(total(&result, "innerPE_over_mcenergy_noselection_subevent0"), 2.0);
        assert_eq!(total(&result, "innerPE_over_mcenergy_noselection_subevent1"), 0.0);
        assert_eq!(total(&result, "totalcharge_nominal_subevent1"), 3.0);
        assert_eq!(total(&result, "totalcharge_over_mcenergy_noselection_subeventall"), 2.0);

        let hist = &result.hist["innerPE_over_mcenergy_noselection_subeventall"];
        let item = hist.items().next().unwrap();
        assert_eq!(item.histogram.mean(), 15.25);
    }

    #[test]
    fn test_combine_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let records = Dataset::from_partitions(vec![
            vec![record("IBD", 1.0), record("IBD", 0.5)],
            vec![record("Background", 1.0)]
        ]);
        let out = reduce(&[boxed(Resolution::new(dir.path()))], &records, &SyncScheduler).unwrap();
        let result = out.into_iter().next().unwrap().downcast::<ResolutionResult>().unwrap();
        assert_eq!(result.hist["deltar_nominal_subeventall"].len(), 3);

        let table = fs::read_to_string(dir.path().join("resolution/deltar_noselection_subeventall.txt")).unwrap();
        assert!(table.contains("Std. Dev. Error"));
        assert!(table.contains("Background"));
        // both candidates sit in the bin centred on 20
        assert!(table.contains("20.000000"));

        let summary = fs::read_to_string(dir.path().join("resolution/summary/deltar_noselection.txt")).unwrap();
        assert!(summary.contains("IBD"));
        assert!(!summary.contains("Background"));
        assert!(!dir.path().join("resolution/summary/deltar_noselection_subevent1.txt").exists());
    }
}
