use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;

use optifold::BoxError;

use crate::algorithm::Algorithm;

use super::write_report;

/// Records when the reduction finished in `timestamp.txt`.
#[derive(Debug, Clone)]
pub struct Timestamp {
    output: PathBuf
}

impl Timestamp {
    pub fn new(output: &Path) -> Self {
        Timestamp { output: output.to_path_buf() }
    }
}

impl <R> Algorithm<R> for Timestamp {
    type Partial = ();
    /// File the time was written to
    type Output = PathBuf;

    fn key(&self) -> Option<String> {
        Some("Timestamp".into())
    }

    fn apply(&self, _record: &R) -> Result<(), BoxError> {
        Ok(())
    }

    fn finish(&self, _partial: ()) -> Result<PathBuf, BoxError> {
        let path = self.output.join("timestamp.txt");
        let now = Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        write_report(&path, &now)?;
        info!("Finished at {}", now);
        Ok(path)
    }
}

#[cfg(test)]
mod timestamp_test {
    use super::*;
    use std::fs;

    #[test]
    fn test_writes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let alg = Timestamp::new(&dir.path().join("nested"));
        let path = <Timestamp as Algorithm<u32>>::finish(&alg, ()).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written.len(), "2020-01-01T00:00:00.000000".len());
        assert_eq!(&written[4..5], "-");
        assert_eq!(&written[10..11], "T");
    }
}
