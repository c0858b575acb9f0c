//! Combine
//! ---
//! Partial results are merged through `Combine`.  Implementations must be
//! associative: folding any partitioning of the same records has to give an
//! equivalent value, since the merge tree chosen by the scheduler is not fixed.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::error::{Error, Result};

/// Associative merge of two partial results.
///
/// ```rust
/// use optifold_analysis::combine::{Combine, combine_all};
///
/// assert_eq!(3usize.combine(&4).unwrap(), 7);
/// assert_eq!("AB".to_owned().combine(&"CD".to_owned()).unwrap(), "ABCD");
/// assert_eq!(combine_all(vec![vec![1], vec![2, 3]]).unwrap(), vec![1, 2, 3]);
/// ```
pub trait Combine: Sized {
    fn combine(&self, other: &Self) -> Result<Self>;
}

macro_rules! checked_sum_combine {
    ($($t:ty),*) => {
        $(
            impl Combine for $t {
                fn combine(&self, other: &Self) -> Result<Self> {
                    self.checked_add(*other).ok_or_else(|| Error::Incompatible(
                        format!("{} + {} overflows {}", self, other, stringify!($t))))
                }
            }
        )*
    }
}

checked_sum_combine!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

macro_rules! float_sum_combine {
    ($($t:ty),*) => {
        $(
            impl Combine for $t {
                fn combine(&self, other: &Self) -> Result<Self> {
                    Ok(*self + *other)
                }
            }
        )*
    }
}

float_sum_combine!(f32, f64);

impl Combine for () {
    fn combine(&self, _other: &Self) -> Result<Self> {
        Ok(())
    }
}

impl Combine for String {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut s = String::with_capacity(self.len() + other.len());
        s.push_str(self);
        s.push_str(other);
        Ok(s)
    }
}

impl <T: Clone> Combine for Vec<T> {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut v = Vec::with_capacity(self.len() + other.len());
        v.extend_from_slice(self);
        v.extend_from_slice(other);
        Ok(v)
    }
}

// None acts as the identity
impl <T: Combine + Clone> Combine for Option<T> {
    fn combine(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Some(l), Some(r)) => l.combine(r).map(Some),
            (Some(v), None) | (None, Some(v)) => Ok(Some(v.clone())),
            (None, None) => Ok(None)
        }
    }
}

impl <K: Ord + Clone, V: Combine + Clone> Combine for BTreeMap<K, V> {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            let merged = match out.get(k) {
                Some(existing) => existing.combine(v)?,
                None => v.clone()
            };
            out.insert(k.clone(), merged);
        }
        Ok(out)
    }
}

impl <K: Hash + Eq + Clone, V: Combine + Clone> Combine for HashMap<K, V> {
    fn combine(&self, other: &Self) -> Result<Self> {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            let merged = match out.get(k) {
                Some(existing) => existing.combine(v)?,
                None => v.clone()
            };
            out.insert(k.clone(), merged);
        }
        Ok(out)
    }
}

/// Folds a non-empty sequence of partials from left to right.
pub fn combine_all<T: Combine, I: IntoIterator<Item=T>>(items: I) -> Result<T> {
    let mut it = items.into_iter();
    let mut acc = it.next().ok_or(Error::EmptyDataset)?;
    for item in it {
        acc = acc.combine(&item)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod combine_test {
    use super::*;

    #[test]
    fn test_option_identity() {
        assert_eq!(Some(2u32).combine(&None).unwrap(), Some(2));
        assert_eq!(Option::<u32>::None.combine(&Some(3)).unwrap(), Some(3));
        assert_eq!(Some(2u32).combine(&Some(3)).unwrap(), Some(5));
        assert_eq!(Option::<u32>::None.combine(&None).unwrap(), None);
    }

    #[test]
    fn test_map_merge_keeps_one_sided_keys() {
        let mut left = BTreeMap::new();
        left.insert("a", 1usize);
        left.insert("b", 2);
        let mut right = BTreeMap::new();
        right.insert("b", 10usize);
        right.insert("c", 5);

        let merged = left.combine(&right).unwrap();
        assert_eq!(merged.get("a"), Some(&1));
        assert_eq!(merged.get("b"), Some(&12));
        assert_eq!(merged.get("c"), Some(&5));
    }

    #[test]
    fn test_hash_map_merge() {
        let left: HashMap<_, _> = vec![(1u8, "x".to_owned())].into_iter().collect();
        let right: HashMap<_, _> = vec![(1u8, "y".to_owned()), (2, "z".to_owned())].into_iter().collect();
        let merged = left.combine(&right).unwrap();
        assert_eq!(merged[&1], "xy");
        assert_eq!(merged[&2], "z");
    }

    #[test]
    fn test_string_grouping_is_associative() {
        let parts = vec!["A", "B", "C", "D"].into_iter().map(String::from).collect::<Vec<_>>();
        let left = parts[0].combine(&parts[1]).unwrap().combine(&parts[2].combine(&parts[3]).unwrap()).unwrap();
        let flat = combine_all(parts).unwrap();
        assert_eq!(left, flat);
        assert_eq!(flat, "ABCD");
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert_eq!(250u8.combine(&5).unwrap(), 255);
        match 250u8.combine(&6) {
            Err(Error::Incompatible(msg)) => assert!(msg.contains("u8")),
            other => panic!("unexpected: {:?}", other)
        }
        assert!(matches!(i64::MIN.combine(&-1), Err(Error::Incompatible(_))));
        let mut counts = BTreeMap::new();
        counts.insert("n", u64::MAX);
        assert!(counts.combine(&counts).is_err());
        assert_eq!(1.5f64.combine(&2.0).unwrap(), 3.5);
    }

    #[test]
    fn test_combine_all_empty() {
        match combine_all(Vec::<u32>::new()) {
            Err(Error::EmptyDataset) => (),
            other => panic!("unexpected: {:?}", other)
        }
    }
}
