//! Selections
//! ---
//! Cuts are plain data: a `Predicate` tree over named fields.  Selections can
//! therefore be stored in the cache alongside the statistics they produced and
//! compared for equality when those statistics are merged.
//!
//! A candidate missing a field a predicate reads fails that predicate.

use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

use crate::event::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Equal,
    NotEqual
}

impl Comparison {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterEq => lhs >= rhs,
            Comparison::Less => lhs < rhs,
            Comparison::LessEq => lhs <= rhs,
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs
        }
    }
}

/// Boolean expression evaluated over a set of candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Passes everything
    Always,

    /// `field <op> value`
    Compare { field: String, op: Comparison, value: f64 },

    /// `low <= field < high`
    Between { field: String, low: f64, high: f64 },

    /// Candidates sharing `group` pass when there are at least `min_count`
    /// of them and their `time` values span less than `window`
    Coincidence { group: String, time: String, min_count: usize, window: f64 },

    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>)
}

impl Predicate {
    pub fn compare(field: &str, op: Comparison, value: f64) -> Self {
        Predicate::Compare { field: field.to_owned(), op: op, value: value }
    }

    pub fn greater(field: &str, value: f64) -> Self {
        Predicate::compare(field, Comparison::Greater, value)
    }

    pub fn less(field: &str, value: f64) -> Self {
        Predicate::compare(field, Comparison::Less, value)
    }

    pub fn between(field: &str, low: f64, high: f64) -> Self {
        Predicate::Between { field: field.to_owned(), low: low, high: high }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Pass/fail for each row.
    ///
    /// ```rust
    /// use optifold_analysis::event::Candidate;
    /// use optifold_analysis::selection::Predicate;
    ///
    /// let rows = vec![Candidate::new(0).with("n9", 3.0), Candidate::new(1).with("n9", 9.0)];
    /// assert_eq!(Predicate::greater("n9", 5.0).mask(&rows), vec![false, true]);
    /// ```
    pub fn mask<F: Fields>(&self, rows: &[F]) -> Vec<bool> {
        match self {
            Predicate::Always => vec![true; rows.len()],
            Predicate::Compare { field, op, value } => rows.iter()
                .map(|r| r.field(field).map_or(false, |v| op.holds(v, *value)))
                .collect(),
            Predicate::Between { field, low, high } => rows.iter()
                .map(|r| r.field(field).map_or(false, |v| *low <= v && v < *high))
                .collect(),
            Predicate::Coincidence { group, time, min_count, window } =>
                coincidence(rows, group, time, *min_count, *window),
            Predicate::Not(p) => p.mask(rows).into_iter().map(|b| !b).collect(),
            Predicate::All(ps) => {
                let mut out = vec![true; rows.len()];
                for p in ps {
                    for (o, b) in out.iter_mut().zip(p.mask(rows)) {
                        *o &= b;
                    }
                }
                out
            },
            Predicate::Any(ps) => {
                let mut out = vec![false; rows.len()];
                for p in ps {
                    for (o, b) in out.iter_mut().zip(p.mask(rows)) {
                        *o |= b;
                    }
                }
                out
            }
        }
    }
}

fn coincidence<F: Fields>(rows: &[F], group: &str, time: &str, min_count: usize, window: f64) -> Vec<bool> {
    // (count, earliest, latest) per group
    let mut groups: HashMap<u64, (usize, f64, f64)> = HashMap::new();
    for r in rows {
        if let Some(g) = r.field(group) {
            let e = groups.entry(g.to_bits()).or_insert((0, f64::INFINITY, f64::NEG_INFINITY));
            e.0 += 1;
            if let Some(t) = r.field(time) {
                e.1 = e.1.min(t);
                e.2 = e.2.max(t);
            }
        }
    }
    rows.iter().map(|r| {
        let g = match r.field(group) {
            Some(g) => g,
            None => return false
        };
        match groups.get(&g.to_bits()) {
            Some((count, lo, hi)) => *count >= min_count && hi >= lo && (hi - lo).abs() < window,
            None => false
        }
    }).collect()
}

/// A named predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cut {
    pub name: String,
    pub predicate: Predicate
}

impl Cut {
    pub fn new(name: &str, predicate: Predicate) -> Self {
        Cut { name: name.to_owned(), predicate: predicate }
    }
}

/// An ordered list of cuts applied in sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    pub cuts: Vec<Cut>
}

impl Selection {
    pub fn new(name: &str, cuts: Vec<Cut>) -> Self {
        Selection { name: name.to_owned(), cuts: cuts }
    }

    /// Each cut's mask evaluated on its own
    pub fn masks<F: Fields>(&self, rows: &[F]) -> Vec<Vec<bool>> {
        self.cuts.iter().map(|c| c.predicate.mask(rows)).collect()
    }

    /// Rows passing every cut
    pub fn passing<F: Fields>(&self, rows: &[F]) -> Vec<bool> {
        let mut out = vec![true; rows.len()];
        for mask in self.masks(rows) {
            for (o, b) in out.iter_mut().zip(mask) {
                *o &= b;
            }
        }
        out
    }

    pub fn select<'a, F: Fields>(&self, rows: &'a [F]) -> Vec<&'a F> {
        rows.iter().zip(self.passing(rows)).filter(|(_, b)| *b).map(|(r, _)| r).collect()
    }
}

/// Standard selections
pub struct SelectionDefs;

impl SelectionDefs {
    /// Fiducial volume, reconstruction quality, hit counts and a prompt/delayed
    /// coincidence within 50 ns.
    pub fn nominal() -> Selection {
        Selection::new("nominal", vec![
            Cut::new("fiducial volume", Predicate::greater("closestPMT", 1500.0)),
            Cut::new("good position", Predicate::greater("good_pos", 0.1)),
            Cut::new("inner hits", Predicate::greater("inner_hit", 4.0)),
            Cut::new("veto hits", Predicate::less("veto_hit", 4.0)),
            Cut::new("coincidence", Predicate::Coincidence {
                group: "mcid".into(),
                time: "t".into(),
                min_count: 2,
                window: 50.0
            })
        ])
    }

    pub fn noselection() -> Selection {
        Selection::new("noselection", vec![Cut::new("all", Predicate::Always)])
    }

    pub fn all() -> Vec<Selection> {
        vec![SelectionDefs::nominal(), SelectionDefs::noselection()]
    }
}
