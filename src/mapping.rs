use serde::{Deserialize, Serialize};

pub type TrackId = u32;

/// Base used for diffs that represent a deleted reference base.
pub const DELETION_BASE: u8 = b'_';

/// Single-base difference between a mapping and the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub position: i64,
    pub base: u8,
    pub is_forward_strand: bool,
    pub replicate_count: u32,
}

/// Base inserted in the read relative to the reference.
///
/// `gap_order` orders insertions anchored at the same reference position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGap {
    pub position: i64,
    pub base: u8,
    pub gap_order: u32,
    pub is_forward_strand: bool,
    pub replicate_count: u32,
}

/// Reconstructed alignment of a read (or of its group of replicates).
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub id: u64,
    pub start: i64,
    pub stop: i64,
    pub track_id: TrackId,
    pub is_forward_strand: bool,
    pub replicate_count: u32,
    pub num_errors: u32,
    pub sequence_id: Option<u64>,
    pub is_best_mapping: bool,
    /// Number of positions the read maps to; 1 for unique reads
    pub mapping_count: u32,
    pub diffs: Vec<Diff>,
    pub gaps: Vec<ReferenceGap>,
}

impl Mapping {
    pub fn has_diffs(&self) -> bool {
        !self.diffs.is_empty() || !self.gaps.is_empty()
    }

    pub fn add_diff(&mut self, diff: Diff) {
        self.diffs.push(diff);
    }

    pub fn add_gap(&mut self, gap: ReferenceGap) {
        self.gaps.push(gap);
    }

    pub fn overlaps(&self, from: i64, to: i64) -> bool {
        self.start <= to && self.stop >= from
    }

    pub fn reduce(&self) -> ReducedMapping {
        ReducedMapping {
            start: self.start,
            stop: self.stop,
            is_forward_strand: self.is_forward_strand,
        }
    }
}

/// Low-memory mapping used for overview rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReducedMapping {
    pub start: i64,
    pub stop: i64,
    pub is_forward_strand: bool,
}

/// Match-quality tier of a read. Tiers are inclusive: every perfect match is a
/// best match and every best match is a common match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MappingClass {
    Perfect,
    BestMatch,
    Common,
}

impl MappingClass {
    pub fn from_tag(value: i64) -> Option<Self> {
        match value {
            1 => Some(MappingClass::Perfect),
            2 => Some(MappingClass::BestMatch),
            3 => Some(MappingClass::Common),
            _ => None,
        }
    }

    pub fn classify(num_errors: u32, is_best_mapping: bool) -> Self {
        match (num_errors, is_best_mapping) {
            (0, true) => MappingClass::Perfect,
            (_, true) => MappingClass::BestMatch,
            _ => MappingClass::Common,
        }
    }

    pub fn is_best(self) -> bool {
        self != MappingClass::Common
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(MappingClass::classify(0, true), MappingClass::Perfect);
        assert_eq!(MappingClass::classify(3, true), MappingClass::BestMatch);
        assert_eq!(MappingClass::classify(0, false), MappingClass::Common);
        assert!(MappingClass::Perfect.is_best());
        assert!(!MappingClass::Common.is_best());
    }

    #[test]
    fn test_class_tag() {
        assert_eq!(MappingClass::from_tag(1), Some(MappingClass::Perfect));
        assert_eq!(MappingClass::from_tag(3), Some(MappingClass::Common));
        assert_eq!(MappingClass::from_tag(7), None);
    }
}
