use std::collections::BTreeMap;
use std::fmt;

use serde_derive::{Deserialize, Serialize};
use tabled::{Table, Tabled};

use crate::combine::Combine;
use crate::error::{Error, Result};
use crate::event::{Category, Fields};
use crate::selection::{Cut, Selection};

fn safe_divide(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

/// Weighted pass counts for a single cut
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CutStats {
    pub total: f64,
    pub passed: f64
}

impl CutStats {
    fn fill(&mut self, passed: bool, weight: f64) {
        self.total += weight;
        if passed {
            self.passed += weight;
        }
    }

    /// Fraction passing; zero when nothing was seen
    pub fn efficiency(&self) -> f64 {
        safe_divide(self.passed, self.total)
    }

    pub fn failed(&self) -> f64 {
        self.total - self.passed
    }
}

impl Combine for CutStats {
    fn combine(&self, other: &Self) -> Result<Self> {
        Ok(CutStats { total: self.total + other.total, passed: self.passed + other.passed })
    }
}

/// Counts of a selection's cuts, each on its own and applied in sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStats {
    selection: Selection,
    individual: Vec<CutStats>,
    cumulative: Vec<CutStats>
}

/// One row of a `SelectionStats`
pub struct StatsItem<'a> {
    pub cut: &'a Cut,
    pub individual: CutStats,
    pub cumulative: CutStats
}

impl SelectionStats {
    pub fn new(selection: Selection) -> Self {
        let n = selection.cuts.len();
        SelectionStats {
            selection: selection,
            individual: vec![CutStats::default(); n],
            cumulative: vec![CutStats::default(); n]
        }
    }

    /// Counts every row with the given weight.
    pub fn fill<F: Fields>(&mut self, rows: &[F], weight: f64) -> &mut Self {
        let mut cumulative = vec![true; rows.len()];
        for (i, mask) in self.selection.masks(rows).into_iter().enumerate() {
            for (row, passed) in mask.into_iter().enumerate() {
                cumulative[row] &= passed;
                self.individual[i].fill(passed, weight);
                self.cumulative[i].fill(cumulative[row], weight);
            }
        }
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn len(&self) -> usize {
        self.individual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individual.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item=StatsItem<'_>> + '_ {
        self.selection.cuts.iter()
            .zip(self.individual.iter().zip(self.cumulative.iter()))
            .map(|(cut, (i, c))| StatsItem { cut: cut, individual: *i, cumulative: *c })
    }

    /// Plain text table of the counts
    pub fn table(&self) -> String {
        let rows = self.items().enumerate().map(|(index, item)| CutRow {
            index: index,
            name: item.cut.name.clone(),
            selected: format!("{:.4}", item.individual.passed),
            efficiency: format!("{:.4}", item.individual.efficiency()),
            cumulative_selected: format!("{:.4}", item.cumulative.passed),
            cumulative_efficiency: format!("{:.4}", item.cumulative.efficiency())
        });
        Table::new(rows).to_string()
    }
}

impl Combine for SelectionStats {
    fn combine(&self, other: &Self) -> Result<Self> {
        if self.selection != other.selection {
            return Err(Error::Incompatible(format!(
                "cannot add statistics of selection {} to {}", other.selection.name, self.selection.name)))
        }
        let zip = |l: &[CutStats], r: &[CutStats]| -> Result<Vec<CutStats>> {
            l.iter().zip(r.iter()).map(|(a, b)| a.combine(b)).collect()
        };
        Ok(SelectionStats {
            selection: self.selection.clone(),
            individual: zip(&self.individual, &other.individual)?,
            cumulative: zip(&self.cumulative, &other.cumulative)?
        })
    }
}

impl fmt::Display for SelectionStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.table())
    }
}

/// `SelectionStats` kept separately for each category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySelectionStats {
    selection: Selection,
    stats: BTreeMap<Category, SelectionStats>
}

impl CategorySelectionStats {
    pub fn new(selection: Selection) -> Self {
        CategorySelectionStats { selection: selection, stats: BTreeMap::new() }
    }

    pub fn fill<F: Fields>(&mut self, category: &Category, rows: &[F], weight: f64) -> &mut Self {
        let selection = &self.selection;
        self.stats.entry(category.clone())
            .or_insert_with(|| SelectionStats::new(selection.clone()))
            .fill(rows, weight);
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn get(&self, category: &Category) -> Option<&SelectionStats> {
        self.stats.get(category)
    }

    /// Categories in order
    pub fn iter(&self) -> impl Iterator<Item=(&Category, &SelectionStats)> + '_ {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Statistics summed over every category
    pub fn total(&self) -> Result<SelectionStats> {
        let mut total = SelectionStats::new(self.selection.clone());
        for s in self.stats.values() {
            total = total.combine(s)?;
        }
        Ok(total)
    }

    /// Per-category table, with each category's share of the selected
    /// weight as its purity
    pub fn table(&self) -> Result<String> {
        let total = self.total()?;
        let mut rows = Vec::new();
        for (category, stats) in self.stats.iter() {
            for (index, (item, all)) in stats.items().zip(total.items()).enumerate() {
                rows.push(CategoryCutRow {
                    category: category.to_string(),
                    index: index,
                    name: item.cut.name.clone(),
                    selected: format!("{:.4}", item.individual.passed),
                    efficiency: format!("{:.4}", item.individual.efficiency()),
                    purity: format!("{:.4}", safe_divide(item.individual.passed, all.individual.passed)),
                    cumulative_selected: format!("{:.4}", item.cumulative.passed),
                    cumulative_efficiency: format!("{:.4}", item.cumulative.efficiency()),
                    cumulative_purity: format!("{:.4}", safe_divide(item.cumulative.passed, all.cumulative.passed))
                });
            }
        }
        Ok(Table::new(rows).to_string())
    }
}

impl Combine for CategorySelectionStats {
    fn combine(&self, other: &Self) -> Result<Self> {
        if self.selection != other.selection {
            return Err(Error::Incompatible(format!(
                "cannot add statistics of selection {} to {}", other.selection.name, self.selection.name)))
        }
        Ok(CategorySelectionStats {
            selection: self.selection.clone(),
            stats: self.stats.combine(&other.stats)?
        })
    }
}

#[derive(Tabled)]
struct CutRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Selected")]
    selected: String,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
    #[tabled(rename = "Cumulative Selected")]
    cumulative_selected: String,
    #[tabled(rename = "Cumulative Efficiency")]
    cumulative_efficiency: String
}

#[derive(Tabled)]
struct CategoryCutRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Selected")]
    selected: String,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
    #[tabled(rename = "Purity")]
    purity: String,
    #[tabled(rename = "Cumulative Selected")]
    cumulative_selected: String,
    #[tabled(rename = "Cumulative Efficiency")]
    cumulative_efficiency: String,
    #[tabled(rename = "Cumulative Purity")]
    cumulative_purity: String
}

#[cfg(test)]
mod stats_test {
    use super::*;
    use crate::event::Candidate;
    use crate::selection::{Predicate, SelectionDefs};

    fn threshold() -> Selection {
        Selection::new("threshold", vec![
            Cut::new("x > 1", Predicate::greater("x", 1.0)),
            Cut::new("y > 1", Predicate::greater("y", 1.0))
        ])
    }

    fn rows() -> Vec<Candidate> {
        vec![
            Candidate::new(0).with("x", 2.0).with("y", 2.0),
            Candidate::new(1).with("x", 2.0).with("y", 0.0),
            Candidate::new(2).with("x", 0.0).with("y", 2.0),
            Candidate::new(3).with("x", 0.0).with("y", 0.0)
        ]
    }

    #[test]
    fn test_individual_and_cumulative() {
        let mut stats = SelectionStats::new(threshold());
        stats.fill(&rows(), 0.5);
        let items: Vec<_> = stats.items().collect();
        assert_eq!(items[0].individual, CutStats { total: 2.0, passed: 1.0 });
        assert_eq!(items[1].individual, CutStats { total: 2.0, passed: 1.0 });
        assert_eq!(items[1].cumulative, CutStats { total: 2.0, passed: 0.5 });
        assert_eq!(items[1].cumulative.efficiency(), 0.25);
        assert_eq!(items[1].cumulative.failed(), 1.5);
    }

    #[test]
    fn test_combine_requires_same_selection() {
        let mut a = SelectionStats::new(threshold());
        a.fill(&rows(), 1.0);
        let b = a.clone();
        let ab = a.combine(&b).unwrap();
        assert_eq!(ab.items().next().unwrap().individual.total, 8.0);

        let other = SelectionStats::new(SelectionDefs::noselection());
        assert!(matches!(a.combine(&other), Err(Error::Incompatible(_))));
    }

    #[test]
    fn test_category_tables() {
        let ibd = Category::new("IBD", 1.0, 1.0);
        let bkg = Category::new("Background", 1.0, 1.0);
        let mut left = CategorySelectionStats::new(threshold());
        left.fill(&ibd, &rows(), 1.0);
        let mut right = CategorySelectionStats::new(threshold());
        right.fill(&bkg, &rows()[..1], 1.0);

        let merged = left.combine(&right).unwrap();
        assert_eq!(merged.len(), 2);
        let total = merged.total().unwrap();
        assert_eq!(total.items().nth(1).unwrap().cumulative.passed, 2.0);

        let table = merged.table().unwrap();
        assert!(table.contains("Cumulative Purity"));
        assert_eq!(table.lines().filter(|l| l.contains("IBD")).count(), 2);
        assert_eq!(table.lines().filter(|l| l.contains("Background")).count(), 2);
        assert!(table.contains("0.5000"));
    }

    #[test]
    fn test_single_table_lists_cuts_in_order() {
        let mut stats = SelectionStats::new(threshold());
        stats.fill(&rows(), 1.0);
        let table = stats.to_string();
        let first = table.find("x > 1").unwrap();
        let second = table.find("y > 1").unwrap();
        assert!(first < second);
        assert!(table.contains("Cumulative Efficiency"));
        assert!(table.contains("0.2500"));
    }
}
