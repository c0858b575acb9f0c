use optifold::BoxError;

use crate::algorithm::Algorithm;

/// Does nothing with any record.  Useful for exercising the reduction and
/// cache machinery on a real dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl <R> Algorithm<R> for Noop {
    type Partial = ();
    type Output = ();

    fn key(&self) -> Option<String> {
        Some("TestAlgorithm".into())
    }

    fn apply(&self, _record: &R) -> Result<(), BoxError> {
        Ok(())
    }

    fn finish(&self, _partial: ()) -> Result<(), BoxError> {
        Ok(())
    }
}
