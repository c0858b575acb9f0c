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
use crate::hist::{Axis, ExposureWeightedHistogram};
use crate::mean::{CategoryMean, WeightedMean};
use crate::selection::{Selection, SelectionDefs};
use crate::variable::{Variable, VariableDefs};

use super::{nth_in_event, subevent_label, write_report, SUBEVENTS};

const TOTAL_CHARGE_HIST: &str = "ibd_total_charge_by_attenuation";
const TOTAL_CHARGE_MEAN: &str = "ibd_total_charge_by_attenuation_mean";
const TOTAL_CHARGE_MEAN_GT10: &str = "ibd_total_charge_by_attenuation_mean_gt10";
const SENSITIVITY_MEAN: &str = "sensitivity_metric";

/// Histograms and per-category means of the standard variables
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BasicHistResult {
    pub hist: BTreeMap<String, ExposureWeightedHistogram>,
    pub scatter: BTreeMap<String, CategoryMean>
}

impl Combine for BasicHistResult {
    fn combine(&self, other: &Self) -> Result<Self> {
        Ok(BasicHistResult {
            hist: self.hist.combine(&other.hist)?,
            scatter: self.scatter.combine(&other.scatter)?
        })
    }
}

/// Fills exposure-weighted histograms of every standard variable under every
/// standard selection, for all candidates and for the first and second
/// candidate of each simulated event.  Signal records also contribute their
/// total charge.  `finish` writes plain text tables under `basichist/`.
#[derive(Debug, Clone)]
pub struct BasicHist {
    output: PathBuf,
    selections: Vec<Selection>,
    variables: Vec<Variable>
}

impl BasicHist {
    pub fn new(output: &Path) -> Self {
        BasicHist {
            output: output.to_path_buf(),
            selections: SelectionDefs::all(),
            variables: VariableDefs::all()
        }
    }

    fn fill_variables(&self, record: &EventRecord, result: &mut BasicHistResult) {
        for selection in self.selections.iter() {
            let selected = selection.select(&record.candidates);
            for subevent in SUBEVENTS.iter() {
                let rows = nth_in_event(&selected, *subevent);
                for variable in self.variables.iter() {
                    let name = format!("{}_{}_{}", variable.name, selection.name, subevent_label(*subevent));
                    let values = variable.values(&rows);
                    let weights = vec![record.exposure; values.len()];
                    result.hist.entry(name.clone())
                        .or_insert_with(|| ExposureWeightedHistogram::new(variable.axis))
                        .fill(&record.category, record.exposure, &values, None);
                    result.scatter.entry(name)
                        .or_insert_with(CategoryMean::new)
                        .fill(&record.category, &values, Some(&weights[..]));
                }
            }
        }
    }

    fn fill_charge(&self, record: &EventRecord, result: &mut BasicHistResult) {
        if !record.category.is_signal() {
            return
        }
        let charge = &record.total_charge;
        let mut hist = ExposureWeightedHistogram::new(Axis::regular(300, 0.0, 150.0));
        hist.fill(&record.category, record.exposure, charge, None);
        result.hist.insert(TOTAL_CHARGE_HIST.into(), hist);

        let mut mean = CategoryMean::new();
        mean.fill(&record.category, charge, None);
        result.scatter.insert(TOTAL_CHARGE_MEAN.into(), mean);

        let above: Vec<f64> = charge.iter().cloned().filter(|q| *q > 10.0).collect();
        let mut mean_gt10 = CategoryMean::new();
        mean_gt10.fill(&record.category, &above, None);
        result.scatter.insert(TOTAL_CHARGE_MEAN_GT10.into(), mean_gt10);
    }

    fn fill_sensitivity(&self, record: &EventRecord, result: &mut BasicHistResult) {
        let mut mean = CategoryMean::new();
        mean.fill(&record.category, &record.sensitivity, None);
        result.scatter.insert(SENSITIVITY_MEAN.into(), mean);
    }

    fn write_hist(&self, key: &str, hist: &ExposureWeightedHistogram) -> Result<()> {
        let mut out = String::new();
        for item in hist.items() {
            out.push_str(&format!("# {} exposure={}\n", item.category, item.exposure));
            out.push_str(&item.histogram.table());
            out.push('\n');
        }
        let path = self.output.join("basichist").join("hist").join(format!("{}.txt", key));
        write_report(&path, &out)?;
        Ok(())
    }

    fn write_scatter(&self, key: &str, mean: &CategoryMean) -> Result<()> {
        let dir = self.output.join("basichist").join("scatter");
        write_report(&dir.join(format!("{}.txt", key)), &scatter_table(mean))?;
        write_report(&dir.join(format!("{}relative.txt", key)), &relative_table(mean))?;
        Ok(())
    }
}

impl Algorithm<EventRecord> for BasicHist {
    type Partial = BasicHistResult;
    type Output = BasicHistResult;

    fn key(&self) -> Option<String> {
        Some("BasicHist".into())
    }

    fn apply(&self, record: &EventRecord) -> std::result::Result<BasicHistResult, BoxError> {
        let mut result = BasicHistResult::default();
        self.fill_variables(record, &mut result);
        self.fill_charge(record, &mut result);
        self.fill_sensitivity(record, &mut result);
        Ok(result)
    }

    fn finish(&self, result: BasicHistResult) -> std::result::Result<BasicHistResult, BoxError> {
        for (key, hist) in result.hist.iter() {
            self.write_hist(key, hist)?;
        }
        for (key, mean) in result.scatter.iter() {
            self.write_scatter(key, mean)?;
        }
        debug!("Wrote {} histograms and {} means", result.hist.len(), result.scatter.len());
        Ok(result)
    }
}

fn safe_divide(num: f64, den: f64) -> f64 {
    if den == 0.0 { f64::NAN } else { num / den }
}

#[derive(Tabled)]
struct MeanRow {
    #[tabled(rename = "Attenuation")]
    attenuation: f64,
    #[tabled(rename = "Event Type")]
    event_type: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Error")]
    error: String
}

#[derive(Tabled)]
struct RelativeMeanRow {
    #[tabled(inline)]
    mean: MeanRow,
    #[tabled(rename = "Relative Mean")]
    relative_mean: String,
    #[tabled(rename = "Relative Error")]
    relative_error: String
}

fn mean_row(category: &Category, m: &WeightedMean) -> MeanRow {
    MeanRow {
        attenuation: category.attenuation,
        event_type: category.event_type.clone(),
        mean: format!("{:.6}", m.value()),
        error: format!("{:.6}", m.error())
    }
}

fn scatter_table(mean: &CategoryMean) -> String {
    Table::new(mean.iter().map(|(category, m)| mean_row(category, m))).to_string()
}

// Relative to the signal category with attenuation closest to 1
fn relative_table(mean: &CategoryMean) -> String {
    let reference = mean.iter()
        .min_by(|(a, _), (b, _)| {
            (!a.is_signal()).cmp(&!b.is_signal())
                .then((a.attenuation - 1.0).abs().total_cmp(&(b.attenuation - 1.0).abs()))
        })
        .map(|(_, m)| m.value())
        .unwrap_or(f64::NAN);

    let rows = mean.iter().map(|(category, m)| RelativeMeanRow {
        mean: mean_row(category, m),
        relative_mean: format!("{:.6}", safe_divide(m.value(), reference)),
        relative_error: format!("{:.6}", safe_divide(m.error(), reference))
    });
    Table::new(rows).to_string()
}

#[cfg(test)]
mod basic_hist_test {
    use super::*;
    use crate::event::Candidate;

    fn candidate(mc_id: u64, t: f64, n9: f64) -> Candidate {
        Candidate::new(mc_id)
            .with("closestPMT", 2000.0)
            .with("good_pos", 0.5)
            .with("inner_hit", 10.0)
            .with("veto_hit", 0.0)
            .with("t", t)
            .with("n9", n9)
    }

    fn ibd() -> EventRecord {
        let mut r = EventRecord::new("IBD_0.root", Category::new("IBD", 1.0, 1.0), 2.0);
        r.candidates = vec![candidate(1, 0.0, 10.0), candidate(1, 20.0, 20.0), candidate(2, 0.0, 30.0)];
        r.total_charge = vec![5.0, 20.0];
        r.sensitivity = vec![0.5, 1.5];
        r
    }

    fn normalised_total(result: &BasicHistResult, key: &str) -> f64 {
        result.hist[key].items().map(|item| item.histogram.total()).sum()
    }

    #[test]
    fn test_apply_fills_every_combination() {
        let alg = BasicHist::new(Path::new("unused"));
        let result = alg.apply(&ibd()).unwrap();
        let combinations = SelectionDefs::all().len() * VariableDefs::all().len() * 3;
        assert_eq!(result.hist.len(), combinations + 1);
        assert_eq!(result.scatter.len(), combinations + 3);

        assert_eq!(normalised_total(&result, "n9_noselection_subeventall"), 1.5);
        // the lone candidate of event 2 fails the coincidence
        assert_eq!(normalised_total(&result, "n9_nominal_subeventall"), 1.0);
        assert_eq!(normalised_total(&result, "n9_noselection_subevent1"), 0.5);

        let cat = Category::new("IBD", 1.0, 1.0);
        assert_eq!(result.scatter[TOTAL_CHARGE_MEAN].get(&cat).unwrap().value(), 12.5);
        assert_eq!(result.scatter[TOTAL_CHARGE_MEAN_GT10].get(&cat).unwrap().value(), 20.0);
        assert_eq!(result.scatter[SENSITIVITY_MEAN].get(&cat).unwrap().value(), 1.0);
        assert_eq!(result.scatter["n9_noselection_subeventall"].get(&cat).unwrap().value(), 20.0);
    }

    #[test]
    fn test_background_has_no_charge_summary() {
        let mut record = ibd();
        record.category = Category::new("Background", 1.0, 1.0);
        let result = BasicHist::new(Path::new("unused")).apply(&record).unwrap();
        assert!(!result.hist.contains_key(TOTAL_CHARGE_HIST));
        assert!(!result.scatter.contains_key(TOTAL_CHARGE_MEAN));
    }

    #[test]
    fn test_combine_and_finish() {
        let dir = tempfile::tempdir().unwrap();
        let alg = BasicHist::new(dir.path());
        let one = alg.apply(&ibd()).unwrap();
        let two = one.combine(&one).unwrap();
        assert_eq!(normalised_total(&two, "n9_noselection_subeventall"), 1.5);

        let done = alg.finish(two).unwrap();
        assert_eq!(done.hist.len(), one.hist.len());
        let hist = dir.path().join("basichist/hist/n9_nominal_subevent0.txt");
        assert!(std::fs::read_to_string(hist).unwrap().starts_with("# IBD"));
        let relative = std::fs::read_to_string(dir.path().join("basichist/scatter/sensitivity_metricrelative.txt")).unwrap();
        assert!(relative.contains("1.000000"));
    }
}
