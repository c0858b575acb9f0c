use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

use crate::combine::Combine;
use crate::error::Result;
use crate::event::Category;

/// Running weighted mean
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightedMean {
    sum_w: f64,
    sum_w2: f64,
    sum_wx: f64,
    sum_wx2: f64
}

impl WeightedMean {
    pub fn fill(&mut self, x: f64, weight: f64) {
        self.sum_w += weight;
        self.sum_w2 += weight * weight;
        self.sum_wx += weight * x;
        self.sum_wx2 += weight * x * x;
    }

    pub fn sum_of_weights(&self) -> f64 {
        self.sum_w
    }

    pub fn value(&self) -> f64 {
        if self.sum_w == 0.0 { f64::NAN } else { self.sum_wx / self.sum_w }
    }

    /// Unbiased weighted sample variance
    pub fn variance(&self) -> f64 {
        let mean = self.value();
        let deltas = self.sum_wx2 - self.sum_w * mean * mean;
        deltas / (self.sum_w - self.sum_w2 / self.sum_w)
    }

    /// Error on the mean
    pub fn error(&self) -> f64 {
        self.variance().sqrt() / self.sum_w.sqrt()
    }
}

impl Combine for WeightedMean {
    fn combine(&self, other: &Self) -> Result<Self> {
        Ok(WeightedMean {
            sum_w: self.sum_w + other.sum_w,
            sum_w2: self.sum_w2 + other.sum_w2,
            sum_wx: self.sum_wx + other.sum_wx,
            sum_wx2: self.sum_wx2 + other.sum_wx2
        })
    }
}

/// Weighted mean of a quantity, per category
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryMean {
    points: BTreeMap<Category, WeightedMean>
}

impl CategoryMean {
    pub fn new() -> Self {
        CategoryMean::default()
    }

    /// Fills each value, with unit weight when `weights` is `None`.
    pub fn fill(&mut self, category: &Category, values: &[f64], weights: Option<&[f64]>) -> &mut Self {
        let point = self.points.entry(category.clone()).or_insert_with(WeightedMean::default);
        match weights {
            Some(ws) => for (x, w) in values.iter().zip(ws) { point.fill(*x, *w) },
            None => for x in values { point.fill(*x, 1.0) }
        }
        self
    }

    pub fn get(&self, category: &Category) -> Option<&WeightedMean> {
        self.points.get(category)
    }

    pub fn iter(&self) -> impl Iterator<Item=(&Category, &WeightedMean)> + '_ {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Combine for CategoryMean {
    fn combine(&self, other: &Self) -> Result<Self> {
        Ok(CategoryMean { points: self.points.combine(&other.points)? })
    }
}

#[cfg(test)]
mod mean_test {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_unit_weights() {
        let mut m = WeightedMean::default();
        for x in &[1.0, 2.0, 3.0, 4.0] {
            m.fill(*x, 1.0);
        }
        assert!(close(m.value(), 2.5));
        // sample variance of 1..4
        assert!(close(m.variance(), 5.0 / 3.0));
        assert!(close(m.error(), (5.0f64 / 3.0).sqrt() / 2.0));
    }

    #[test]
    fn test_combine_matches_single_fill() {
        let cat = Category::new("IBD", 1.0, 1.0);
        let mut whole = CategoryMean::new();
        whole.fill(&cat, &[1.0, 2.0, 3.0], Some(&[1.0, 2.0, 3.0][..]));
        let mut left = CategoryMean::new();
        left.fill(&cat, &[1.0], Some(&[1.0][..]));
        let mut right = CategoryMean::new();
        right.fill(&cat, &[2.0, 3.0], Some(&[2.0, 3.0][..]));

        let merged = left.combine(&right).unwrap();
        let (a, b) = (merged.get(&cat).unwrap(), whole.get(&cat).unwrap());
        assert!(close(a.value(), b.value()));
        assert!(close(a.variance(), b.variance()));
        assert!(close(a.value(), 14.0 / 6.0));
    }

    #[test]
    fn test_empty_mean_is_nan() {
        assert!(WeightedMean::default().value().is_nan());
    }
}
