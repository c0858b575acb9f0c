use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};
use tabled::{Table, Tabled};

use crate::combine::Combine;
use crate::error::{Error, Result};
use crate::event::Category;

/// Regularly spaced binning over `[low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: usize,
    pub low: f64,
    pub high: f64
}

/// Where a value lands on an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bin {
    Underflow,
    Index(usize),
    Overflow
}

impl Axis {
    pub fn regular(bins: usize, low: f64, high: f64) -> Self {
        Axis { bins: bins.max(1), low: low, high: high }
    }

    /// NaN is counted as overflow.
    pub fn locate(&self, x: f64) -> Bin {
        if x < self.low {
            Bin::Underflow
        } else if x >= self.high || x.is_nan() {
            Bin::Overflow
        } else {
            let width = (self.high - self.low) / self.bins as f64;
            let i = ((x - self.low) / width) as usize;
            Bin::Index(i.min(self.bins - 1))
        }
    }

    pub fn center(&self, i: usize) -> f64 {
        let (lo, hi) = self.edges(i);
        0.5 * (lo + hi)
    }

    /// Lower and upper edge of bin `i`
    pub fn edges(&self, i: usize) -> (f64, f64) {
        let width = (self.high - self.low) / self.bins as f64;
        (self.low + width * i as f64, self.low + width * (i + 1) as f64)
    }
}

/// Weighted one dimensional histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    axis: Axis,
    counts: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64
}

impl Histogram {
    pub fn new(axis: Axis) -> Self {
        Histogram {
            axis: axis,
            counts: vec![0.0; axis.bins],
            sumw2: vec![0.0; axis.bins],
            underflow: 0.0,
            overflow: 0.0
        }
    }

    pub fn fill(&mut self, x: f64, weight: f64) {
        match self.axis.locate(x) {
            Bin::Underflow => self.underflow += weight,
            Bin::Overflow => self.overflow += weight,
            Bin::Index(i) => {
                self.counts[i] += weight;
                self.sumw2[i] += weight * weight;
            }
        }
    }

    /// Fills each value, with unit weight when `weights` is `None`.
    pub fn fill_all(&mut self, values: &[f64], weights: Option<&[f64]>) {
        match weights {
            Some(ws) => for (x, w) in values.iter().zip(ws) { self.fill(*x, *w) },
            None => for x in values { self.fill(*x, 1.0) }
        }
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Statistical error on each bin
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|w2| w2.sqrt()).collect()
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// In-range sum of weights
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Mean of the in-range contents, each bin taken at its centre.  NaN
    /// when empty.
    pub fn mean(&self) -> f64 {
        let total = self.total();
        if total == 0.0 {
            return f64::NAN
        }
        self.counts.iter().enumerate()
            .map(|(i, c)| self.axis.center(i) * c)
            .sum::<f64>() / total
    }

    /// Standard deviation of the in-range contents.  NaN when empty.
    pub fn std_dev(&self) -> f64 {
        let total = self.total();
        if total == 0.0 {
            return f64::NAN
        }
        let mean = self.mean();
        let variance = self.counts.iter().enumerate()
            .map(|(i, c)| (self.axis.center(i) - mean).powi(2) * c)
            .sum::<f64>() / total;
        variance.sqrt()
    }

    /// Kish effective number of in-range entries
    pub fn effective_entries(&self) -> f64 {
        let sumw2: f64 = self.sumw2.iter().sum();
        if sumw2 == 0.0 { 0.0 } else { self.total().powi(2) / sumw2 }
    }

    pub fn scaled(&self, factor: f64) -> Histogram {
        Histogram {
            axis: self.axis,
            counts: self.counts.iter().map(|c| c * factor).collect(),
            sumw2: self.sumw2.iter().map(|w| w * factor * factor).collect(),
            underflow: self.underflow * factor,
            overflow: self.overflow * factor
        }
    }

    /// Plain text table: one row per bin
    pub fn table(&self) -> String {
        let rows = self.counts.iter().zip(self.errors()).enumerate().map(|(i, (c, e))| {
            let (low, high) = self.axis.edges(i);
            BinRow { low: low, high: high, content: format!("{:.6}", c), error: format!("{:.6}", e) }
        });
        Table::new(rows).to_string()
    }
}

#[derive(Tabled)]
struct BinRow {
    #[tabled(rename = "Low")]
    low: f64,
    #[tabled(rename = "High")]
    high: f64,
    #[tabled(rename = "Content")]
    content: String,
    #[tabled(rename = "Error")]
    error: String
}

impl Combine for Histogram {
    fn combine(&self, other: &Self) -> Result<Self> {
        if self.axis != other.axis {
            return Err(Error::Incompatible(format!("histogram axes differ: {:?} vs {:?}", self.axis, other.axis)))
        }
        let add = |l: &[f64], r: &[f64]| -> Vec<f64> { l.iter().zip(r).map(|(a, b)| a + b).collect() };
        Ok(Histogram {
            axis: self.axis,
            counts: add(&self.counts, &other.counts),
            sumw2: add(&self.sumw2, &other.sumw2),
            underflow: self.underflow + other.underflow,
            overflow: self.overflow + other.overflow
        })
    }
}

/// Per-category histograms along with the exposure each was filled from.
/// Reading a category back divides its histogram by the category's exposure,
/// giving a rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureWeightedHistogram {
    axis: Axis,
    hists: BTreeMap<Category, Histogram>,
    exposure: BTreeMap<Category, f64>
}

/// A category's normalised histogram
pub struct ExposureItem<'a> {
    pub category: &'a Category,
    pub histogram: Histogram,
    pub exposure: f64
}

impl ExposureWeightedHistogram {
    pub fn new(axis: Axis) -> Self {
        ExposureWeightedHistogram { axis: axis, hists: BTreeMap::new(), exposure: BTreeMap::new() }
    }

    /// Adds one record's worth of values.  `exposure` is counted once per call.
    pub fn fill(&mut self, category: &Category, exposure: f64, values: &[f64], weights: Option<&[f64]>) -> &mut Self {
        let axis = self.axis;
        self.hists.entry(category.clone())
            .or_insert_with(|| Histogram::new(axis))
            .fill_all(values, weights);
        *self.exposure.entry(category.clone()).or_insert(0.0) += exposure;
        self
    }

    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    pub fn len(&self) -> usize {
        self.hists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hists.is_empty()
    }

    pub fn contains(&self, category: &Category) -> bool {
        self.hists.contains_key(category)
    }

    /// Histograms in category order, normalised by exposure
    pub fn items(&self) -> impl Iterator<Item=ExposureItem<'_>> + '_ {
        self.hists.iter().map(move |(category, h)| {
            let exposure = self.exposure.get(category).cloned().unwrap_or(0.0);
            let scale = if exposure > 0.0 { 1.0 / exposure } else { 0.0 };
            ExposureItem { category: category, histogram: h.scaled(scale), exposure: exposure }
        })
    }
}

impl Combine for ExposureWeightedHistogram {
    fn combine(&self, other: &Self) -> Result<Self> {
        if self.axis != other.axis {
            return Err(Error::Incompatible(format!("histogram axes differ: {:?} vs {:?}", self.axis, other.axis)))
        }
        Ok(ExposureWeightedHistogram {
            axis: self.axis,
            hists: self.hists.combine(&other.hists)?,
            exposure: self.exposure.combine(&other.exposure)?
        })
    }
}

#[cfg(test)]
mod hist_test {
    use super::*;

    #[test]
    fn test_locate() {
        let axis = Axis::regular(26, 0.0, 60.0);
        assert_eq!(axis.locate(-1.0), Bin::Underflow);
        assert_eq!(axis.locate(0.0), Bin::Index(0));
        assert_eq!(axis.locate(59.99), Bin::Index(25));
        assert_eq!(axis.locate(60.0), Bin::Overflow);
        assert_eq!(axis.locate(f64::NAN), Bin::Overflow);
    }

    #[test]
    fn test_fill_and_combine() {
        let axis = Axis::regular(2, 0.0, 2.0);
        let mut a = Histogram::new(axis);
        a.fill_all(&[0.5, 1.5, 1.5, 3.0], None);
        let mut b = Histogram::new(axis);
        b.fill_all(&[0.5, -1.0], Some(&[2.0, 1.0][..]));

        let ab = a.combine(&b).unwrap();
        assert_eq!(ab.counts(), &[3.0, 2.0]);
        assert_eq!(ab.underflow(), 1.0);
        assert_eq!(ab.overflow(), 1.0);
        assert_eq!(ab.errors()[0], 5.0f64.sqrt());

        let other = Histogram::new(Axis::regular(3, 0.0, 2.0));
        assert!(matches!(a.combine(&other), Err(Error::Incompatible(_))));
    }

    #[test]
    fn test_exposure_normalisation() {
        let ibd = Category::new("IBD", 1.0, 1.0);
        let axis = Axis::regular(1, 0.0, 1.0);
        let mut first = ExposureWeightedHistogram::new(axis);
        first.fill(&ibd, 2.0, &[0.0, 0.0], None);
        let mut second = ExposureWeightedHistogram::new(axis);
        second.fill(&ibd, 2.0, &[0.0, 0.0, 0.0, 0.0], None);

        let merged = first.combine(&second).unwrap();
        let item = merged.items().next().unwrap();
        assert_eq!(item.exposure, 4.0);
        assert_eq!(item.histogram.counts(), &[1.5]);
        assert!(merged.contains(&ibd));
    }

    #[test]
    fn test_binned_moments() {
        let mut h = Histogram::new(Axis::regular(4, 0.0, 4.0));
        h.fill_all(&[0.5, 1.5, 1.5, 2.5, 9.0], None);
        assert_eq!(h.mean(), 1.5);
        assert_eq!(h.std_dev(), 0.5f64.sqrt());
        assert_eq!(h.effective_entries(), 4.0);

        let scaled = h.scaled(0.25);
        assert_eq!(scaled.mean(), 1.5);
        assert_eq!(scaled.effective_entries(), 4.0);

        let empty = Histogram::new(Axis::regular(4, 0.0, 4.0));
        assert!(empty.mean().is_nan());
        assert!(empty.std_dev().is_nan());
        assert_eq!(empty.effective_entries(), 0.0);
    }

    #[test]
    fn test_table_has_a_row_per_bin() {
        let mut h = Histogram::new(Axis::regular(2, 0.0, 2.0));
        h.fill_all(&[0.5, 1.5, 1.5], None);
        let table = h.table();
        assert!(table.contains("Content"));
        assert!(table.contains("1.000000"));
        assert!(table.contains("2.000000"));
        assert!(table.contains("1.414214"));
    }
}
