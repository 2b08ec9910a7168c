use crate::mapping::MappingClass;

/// Alignment record as read from a file-backed track
///
/// ## Field interpretation:
/// - `start`/`stop`: 1-based inclusive reference span of the aligned bases
/// - `cigar`: textual CIGAR, parsed lazily by the reconstruction
/// - `classification`: match class tag, derived from `num_errors` when absent
/// - `replicate_count`: number of identical reads the record stands for (1 when absent)
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub start: i64,
    pub stop: i64,
    pub strand: Strand,
    pub cigar: String,
    pub read_sequence: Vec<u8>,
    pub classification: Option<MappingClass>,
    pub replicate_count: Option<u32>,
    pub num_errors: Option<u32>,
    pub mapping_count: Option<u32>,
}

/// Strand orientation for alignments
#[derive(Default, PartialEq, Eq, Clone, Copy, Debug)]
#[repr(u8)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl AlignmentRecord {
    pub fn is_forward(&self) -> bool {
        self.strand == Strand::Forward
    }

    pub fn replicates(&self) -> u32 {
        self.replicate_count.unwrap_or(1)
    }

    /// Match class of the record. Without a classification tag an error-free
    /// record is a perfect match and any other reported alignment a best match.
    pub fn class(&self) -> MappingClass {
        match (self.classification, self.num_errors) {
            (Some(class), _) => class,
            (None, Some(0)) => MappingClass::Perfect,
            (None, _) => MappingClass::BestMatch,
        }
    }

    pub fn errors(&self) -> u32 {
        match self.num_errors {
            Some(errors) => errors,
            None if self.class() == MappingClass::Perfect => 0,
            None => 1,
        }
    }

    pub fn mappings(&self) -> u32 {
        self.mapping_count.unwrap_or(1)
    }

    pub fn overlaps(&self, from: i64, to: i64) -> bool {
        self.start <= to && self.stop >= from
    }
}

/// Alignment file format types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignmentFormat {
    Bam,
    Cram,
    Sam,
}

impl AlignmentFormat {
    /// Detect format from file extension
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with(".bam") {
            Some(AlignmentFormat::Bam)
        } else if path.ends_with(".cram") {
            Some(AlignmentFormat::Cram)
        } else if path.ends_with(".sam") || path.ends_with(".sam.gz") {
            Some(AlignmentFormat::Sam)
        } else {
            None
        }
    }

    /// Whether random access through an index is possible for this format.
    pub fn is_indexable(&self) -> bool {
        matches!(self, AlignmentFormat::Bam | AlignmentFormat::Cram)
    }
}
