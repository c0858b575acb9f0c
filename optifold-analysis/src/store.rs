use std::fs::{remove_file, File};
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snap::read::FrameDecoder;
use snap::write::FrameEncoder;
use uuid::Uuid;

use crate::error::Result;

type Visit<R> = fn(&Path, usize, &mut dyn FnMut(&R) -> Result<()>) -> Result<()>;

/// Streams records into a new, uniquely named file under a directory.
pub struct SpillWriter<R> {
    path: Option<PathBuf>,
    out: FrameEncoder<BufWriter<File>>,
    len: usize,
    items: PhantomData<fn(&R)>
}

impl <R: Serialize + DeserializeOwned> SpillWriter<R> {
    pub fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(format!("optifold-{}", Uuid::new_v4()));
        let fd = File::create(&path)?;
        debug!("Spilling records to {}", path.display());
        Ok(SpillWriter {
            path: Some(path),
            out: FrameEncoder::new(BufWriter::new(fd)),
            len: 0,
            items: PhantomData
        })
    }

    pub fn add(&mut self, record: &R) -> Result<()> {
        bincode::serialize_into(&mut self.out, record)?;
        self.len += 1;
        Ok(())
    }

    /// Flushes everything written so far and hands the file over to a `SpillFile`.
    pub fn finish(mut self) -> Result<SpillFile<R>> {
        self.out.flush()?;
        let path = self.path.take().unwrap_or_default();
        Ok(SpillFile {
            path: path,
            len: self.len,
            visit: visit_records::<R>,
            items: PhantomData
        })
    }
}

impl <R> Drop for SpillWriter<R> {
    // Abandoned writers leave nothing behind
    fn drop(&mut self) {
        if let Some(ref path) = self.path {
            if let Err(e) = remove_file(path) {
                warn!("Error deleting {}: {}", path.display(), e);
            }
        }
    }
}

fn visit_records<R: DeserializeOwned>(path: &Path, len: usize, f: &mut dyn FnMut(&R) -> Result<()>) -> Result<()> {
    for record in RecordStream::<R>::open(path, len)? {
        f(&record?)?;
    }
    Ok(())
}

/// Records spilled to disk.  The file is removed when this is dropped.
pub struct SpillFile<R> {
    path: PathBuf,
    len: usize,
    visit: Visit<R>,
    items: PhantomData<fn() -> R>
}

impl <R> SpillFile<R> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the records back in order, stopping at the first failure.
    pub fn for_each(&self, f: &mut dyn FnMut(&R) -> Result<()>) -> Result<()> {
        (self.visit)(&self.path, self.len, f)
    }
}

impl <R: DeserializeOwned> SpillFile<R> {
    pub fn stream(&self) -> Result<RecordStream<R>> {
        RecordStream::open(&self.path, self.len)
    }
}

impl <R> Drop for SpillFile<R> {
    fn drop(&mut self) {
        if let Err(e) = remove_file(&self.path) {
            warn!("Error deleting {}: {}", self.path.display(), e);
        }
    }
}

/// Iterator over the records of a spill file
pub struct RecordStream<R> {
    reader: FrameDecoder<BufReader<File>>,
    remaining: usize,
    items: PhantomData<fn() -> R>
}

impl <R: DeserializeOwned> RecordStream<R> {
    fn open(path: &Path, len: usize) -> Result<Self> {
        let fd = File::open(path)?;
        Ok(RecordStream { reader: FrameDecoder::new(BufReader::new(fd)), remaining: len, items: PhantomData })
    }
}

impl <R: DeserializeOwned> Iterator for RecordStream<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None
        }
        match bincode::deserialize_from(&mut self.reader) {
            Ok(record) => {
                self.remaining -= 1;
                Some(Ok(record))
            },
            Err(e) => {
                self.remaining = 0;
                Some(Err(e.into()))
            }
        }
    }
}
