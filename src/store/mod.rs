// src/store/mod.rs
//! Interval-keyed store contract.
//!
//! The store holds materialized tracks: per-position coverage, mapping rows and
//! diff rows. Mapping ids form one id space shared by all tracks, a track with a
//! larger id owns larger mapping ids.

pub mod memory;

use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::mapping::{Diff, Mapping, ReferenceGap, TrackId};
use crate::request::ReadClassParams;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;

/// Description of a track. A track with a `file_path` is file-backed and has no
/// materialized data in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub name: String,
    pub chromosome: String,
    pub reference_length: i64,
    pub file_path: Option<String>,
}

impl TrackInfo {
    pub fn is_file_backed(&self) -> bool {
        self.file_path.is_some()
    }
}

/// Mapping columns as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
    pub id: u64,
    pub start: i64,
    pub stop: i64,
    pub is_forward_strand: bool,
    pub replicate_count: u32,
    pub num_errors: u32,
    pub sequence_id: Option<u64>,
    pub is_best_mapping: bool,
    pub mapping_count: u32,
}

impl MappingRow {
    pub fn to_mapping(&self, track_id: TrackId) -> Mapping {
        Mapping {
            id: self.id,
            start: self.start,
            stop: self.stop,
            track_id,
            is_forward_strand: self.is_forward_strand,
            replicate_count: self.replicate_count,
            num_errors: self.num_errors,
            sequence_id: self.sequence_id,
            is_best_mapping: self.is_best_mapping,
            mapping_count: self.mapping_count,
            diffs: Vec::new(),
            gaps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffKind {
    Substitution,
    Gap { order: u32 },
}

/// Diff columns as stored, keyed by the owning mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRow {
    pub mapping_id: u64,
    pub position: i64,
    pub base: u8,
    pub is_forward_strand: bool,
    pub replicate_count: u32,
    pub kind: DiffKind,
}

/// One row of the mapping/diff join: a mapping with one of its diffs, or a
/// mapping without diffs.
pub type JoinedRow = (MappingRow, Option<DiffRow>);

pub trait TrackStore: Send + Sync {
    fn tracks(&self) -> Result<Vec<TrackInfo>>;

    fn track(&self, track_id: TrackId) -> Result<TrackInfo> {
        self.tracks()?
            .into_iter()
            .find(|track| track.id == track_id)
            .ok_or(Error::UnknownTrack(track_id))
    }

    /// Coverage of exactly `[from, to]`; positions outside the reference are zero.
    fn fetch_coverage(&self, track_id: TrackId, from: i64, to: i64) -> Result<Coverage>;

    /// Mappings overlapping `[from, to]`, joined with their diffs when asked for.
    fn fetch_mappings(&self, track_id: TrackId, from: i64, to: i64, with_diffs: bool)
        -> Result<Vec<JoinedRow>>;

    /// Mappings with ids in `[from_id, to_id]`.
    fn fetch_mappings_by_id(
        &self,
        track_id: TrackId,
        from_id: u64,
        to_id: u64,
        with_diffs: bool,
    ) -> Result<Vec<JoinedRow>>;

    fn count_unique_mappings(&self, track_id: TrackId) -> Result<u64>;

    fn reference_length(&self, track_id: TrackId) -> Result<i64>;
}

/// Fold joined rows into mappings. Diffs are attached to their mapping through
/// an id lookup so several rows of one mapping produce a single object. Rows
/// failing the read-class filter are dropped; the order of first occurrence is kept.
pub fn assemble_mappings(
    rows: Vec<JoinedRow>,
    track_id: TrackId,
    read_classes: &ReadClassParams,
) -> Result<Vec<Mapping>> {
    let mut order: Vec<u64> = Vec::new();
    let mut by_id: FxHashMap<u64, Mapping> = FxHashMap::default();
    for (row, diff) in rows {
        if !read_classes.accepts(row.num_errors, row.is_best_mapping, row.mapping_count) {
            continue;
        }
        let mapping = by_id.entry(row.id).or_insert_with(|| {
            order.push(row.id);
            row.to_mapping(track_id)
        });
        if let Some(diff) = diff {
            match diff.kind {
                DiffKind::Substitution => mapping.add_diff(Diff {
                    position: diff.position,
                    base: diff.base,
                    is_forward_strand: diff.is_forward_strand,
                    replicate_count: diff.replicate_count,
                }),
                DiffKind::Gap { order } => mapping.add_gap(ReferenceGap {
                    position: diff.position,
                    base: diff.base,
                    gap_order: order,
                    is_forward_strand: diff.is_forward_strand,
                    replicate_count: diff.replicate_count,
                }),
            }
        }
    }
    let mut mappings = Vec::new();
    mappings.try_reserve_exact(order.len())?;
    mappings.extend(order.iter().filter_map(|id| by_id.remove(id)));
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, num_errors: u32, is_best: bool) -> MappingRow {
        MappingRow {
            id,
            start: 10,
            stop: 20,
            is_forward_strand: true,
            replicate_count: 1,
            num_errors,
            sequence_id: Some(id),
            is_best_mapping: is_best,
            mapping_count: 1,
        }
    }

    fn diff(mapping_id: u64, position: i64, kind: DiffKind) -> DiffRow {
        DiffRow {
            mapping_id,
            position,
            base: b'A',
            is_forward_strand: true,
            replicate_count: 1,
            kind,
        }
    }

    #[test]
    fn test_assemble_attaches_diffs_to_one_mapping() {
        let rows = vec![
            (row(1, 2, true), Some(diff(1, 12, DiffKind::Substitution))),
            (row(1, 2, true), Some(diff(1, 15, DiffKind::Gap { order: 0 }))),
            (row(2, 0, true), None),
            (row(1, 2, true), Some(diff(1, 18, DiffKind::Substitution))),
        ];
        let mappings = assemble_mappings(rows, 3, &ReadClassParams::default()).unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].id, 1);
        assert_eq!(mappings[0].diffs.len(), 2);
        assert_eq!(mappings[0].gaps.len(), 1);
        assert_eq!(mappings[1].id, 2);
        assert!(!mappings[1].has_diffs());
        assert!(mappings.iter().all(|m| m.track_id == 3));
    }

    #[test]
    fn test_assemble_applies_read_classes() {
        let rows = vec![(row(1, 0, true), None), (row(2, 3, false), None)];
        let perfect_only = ReadClassParams::new(true, false, false, false);
        let mappings = assemble_mappings(rows, 0, &perfect_only).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].id, 1);
    }
}
