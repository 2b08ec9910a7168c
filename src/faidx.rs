use crate::error::{Error, Result};
use crate::reconstruct::ReferenceWindow;
use rust_htslib::faidx;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;

/// Source of reference bases for diff reconstruction.
pub trait ReferenceSource: Send + Sync {
    /// Bases of the 1-based inclusive interval `[from, to]`.
    fn fetch(&self, chromosome: &str, from: i64, to: i64) -> Result<ReferenceWindow>;
}

// Simple cache for FASTA file handles with random eviction
struct FaidxCache {
    capacity: usize,
    readers: HashMap<String, faidx::Reader>,
}

impl FaidxCache {
    fn new(capacity: usize) -> Self {
        FaidxCache {
            capacity,
            readers: HashMap::with_capacity(capacity),
        }
    }

    fn get_or_open(&mut self, path: &str) -> io::Result<&mut faidx::Reader> {
        // Evict one random entry if at capacity
        if !self.readers.contains_key(path) && self.readers.len() >= self.capacity {
            if let Some(key_to_remove) = self.readers.keys().next().cloned() {
                self.readers.remove(&key_to_remove);
            }
        }

        match self.readers.entry(path.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let reader = faidx::Reader::from_path(path).map_err(|e| {
                    io::Error::other(format!("Failed to open FASTA file '{path}': {e}"))
                })?;
                Ok(entry.insert(reader))
            }
        }
    }
}

thread_local! {
    // Per-thread cache, one entry per reference file a worker touches
    static FAIDX_CACHE: RefCell<FaidxCache> = RefCell::new(FaidxCache::new(4));
}

/// Indexed FASTA reference (`.fai` is created by htslib when missing).
#[derive(Debug, Clone)]
pub struct FastaReference {
    path: String,
}

impl FastaReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ReferenceSource for FastaReference {
    fn fetch(&self, chromosome: &str, from: i64, to: i64) -> Result<ReferenceWindow> {
        if from > to || from < 1 {
            return Err(Error::InvalidInterval { from, to });
        }
        FAIDX_CACHE.with(|cache_cell| -> Result<ReferenceWindow> {
            let mut cache = cache_cell.borrow_mut();
            let reader = cache.get_or_open(&self.path)?;

            // fetch_seq takes 0-based inclusive coordinates
            let seq_vec = match reader.fetch_seq(chromosome, (from - 1) as usize, (to - 1) as usize) {
                Ok(seq) => {
                    let seq_vec = seq.to_vec();
                    unsafe { libc::free(seq.as_ptr() as *mut std::ffi::c_void) }; // Free up memory to avoid memory leak (bug https://github.com/rust-bio/rust-htslib/issues/401#issuecomment-1704290171)
                    seq_vec
                }
                Err(e) => {
                    return Err(Error::Io(io::Error::other(format!(
                        "Failed to fetch sequence for {chromosome}: {e}"
                    ))))
                }
            };

            Ok(ReferenceWindow::new(from, seq_vec))
        })
    }
}
