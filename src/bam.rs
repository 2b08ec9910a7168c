//! Alignment access for file-backed tracks.

use crate::alignment_record::{AlignmentRecord, Strand};
use crate::error::{Error, Result};
use crate::mapping::MappingClass;
use log::debug;
use rust_htslib::bam::{self, record::Aux, Read as _};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::hash_map::Entry;

/// Tag holding the match class (1 = perfect, 2 = best match, 3 = common match)
pub const CLASSIFICATION_TAG: &[u8] = b"Yc";
/// Tag holding the number of positions a read maps to
pub const MAPPING_COUNT_TAG: &[u8] = b"Yt";
/// Tag holding the number of identical reads a record stands for
pub const REPLICATES_TAG: &[u8] = b"Yr";

/// Source of alignment records overlapping a reference interval.
pub trait AlignmentSource: Send + Sync {
    /// Records overlapping the 1-based inclusive interval `[from, to]`.
    fn query_overlapping(&self, chromosome: &str, from: i64, to: i64) -> Result<Vec<AlignmentRecord>>;

    fn reference_length(&self, chromosome: &str) -> Result<i64>;
}

thread_local! {
    // Per-thread readers: each worker thread keeps its own file handles
    static BAM_READERS: RefCell<FxHashMap<String, bam::IndexedReader>> =
        RefCell::new(FxHashMap::default());
}

/// Indexed BAM/CRAM file.
#[derive(Debug, Clone)]
pub struct BamFile {
    path: String,
}

impl BamFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn with_reader<T>(&self, f: impl FnOnce(&mut bam::IndexedReader) -> Result<T>) -> Result<T> {
        BAM_READERS.with(|cell| {
            let mut readers = cell.borrow_mut();
            let reader = match readers.entry(self.path.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    debug!("Opening alignment file '{}'", self.path);
                    entry.insert(bam::IndexedReader::from_path(&self.path)?)
                }
            };
            f(reader)
        })
    }
}

fn aux_int(record: &bam::Record, tag: &[u8]) -> Option<i64> {
    match record.aux(tag).ok()? {
        Aux::I8(v) => Some(v as i64),
        Aux::U8(v) => Some(v as i64),
        Aux::I16(v) => Some(v as i64),
        Aux::U16(v) => Some(v as i64),
        Aux::I32(v) => Some(v as i64),
        Aux::U32(v) => Some(v as i64),
        _ => None,
    }
}

fn to_alignment_record(record: &bam::Record) -> AlignmentRecord {
    let cigar = record.cigar();
    let non_negative = |v: i64| u32::try_from(v).ok();
    AlignmentRecord {
        start: record.pos() + 1,
        // 0-based exclusive end equals the 1-based inclusive stop
        stop: cigar.end_pos(),
        strand: if record.is_reverse() {
            Strand::Reverse
        } else {
            Strand::Forward
        },
        cigar: cigar.to_string(),
        read_sequence: record.seq().as_bytes(),
        classification: aux_int(record, CLASSIFICATION_TAG).and_then(MappingClass::from_tag),
        replicate_count: aux_int(record, REPLICATES_TAG).and_then(non_negative),
        num_errors: aux_int(record, b"NM").and_then(non_negative),
        mapping_count: aux_int(record, MAPPING_COUNT_TAG)
            .or_else(|| aux_int(record, b"NH"))
            .and_then(non_negative),
    }
}

impl AlignmentSource for BamFile {
    fn query_overlapping(&self, chromosome: &str, from: i64, to: i64) -> Result<Vec<AlignmentRecord>> {
        if from > to {
            return Err(Error::InvalidInterval { from, to });
        }
        self.with_reader(|reader| {
            reader.fetch((chromosome, (from - 1).max(0), to))?;
            let mut records = Vec::new();
            let mut record = bam::Record::new();
            while let Some(result) = reader.read(&mut record) {
                result?;
                if record.is_unmapped() {
                    continue;
                }
                records.try_reserve(1)?;
                records.push(to_alignment_record(&record));
            }
            debug!(
                "Fetched {} records from {}:{}-{} in '{}'",
                records.len(),
                chromosome,
                from,
                to,
                self.path
            );
            Ok(records)
        })
    }

    fn reference_length(&self, chromosome: &str) -> Result<i64> {
        self.with_reader(|reader| {
            let header = reader.header();
            header
                .tid(chromosome.as_bytes())
                .and_then(|tid| header.target_len(tid))
                .map(|len| len as i64)
                .ok_or_else(|| {
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Sequence '{}' not found in '{}'", chromosome, self.path),
                    ))
                })
        })
    }
}
