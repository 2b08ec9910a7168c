//! Per-track data access: materialized in the store or read from an alignment file.

use crate::alignment_record::AlignmentRecord;
use crate::bam::{AlignmentSource, BamFile};
use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::faidx::ReferenceSource;
use crate::mapping::{Mapping, MappingClass, TrackId};
use crate::reconstruct;
use crate::request::ReadClassParams;
use crate::store::{assemble_mappings, TrackInfo, TrackStore};
use log::debug;
use std::sync::Arc;

/// A track whose alignments are read from an indexed file on every request.
pub struct FileTrack {
    track_id: TrackId,
    chromosome: String,
    alignments: Arc<dyn AlignmentSource>,
    reference: Option<Arc<dyn ReferenceSource>>,
    soft_clips_as_mismatches: bool,
}

pub enum TrackSource {
    Store {
        store: Arc<dyn TrackStore>,
        track_id: TrackId,
    },
    File(FileTrack),
}

impl TrackSource {
    pub fn store(store: Arc<dyn TrackStore>, track_id: TrackId) -> Self {
        TrackSource::Store { store, track_id }
    }

    pub fn file(
        track_id: TrackId,
        chromosome: &str,
        alignments: Arc<dyn AlignmentSource>,
        reference: Option<Arc<dyn ReferenceSource>>,
        soft_clips_as_mismatches: bool,
    ) -> Self {
        TrackSource::File(FileTrack {
            track_id,
            chromosome: chromosome.to_string(),
            alignments,
            reference,
            soft_clips_as_mismatches,
        })
    }

    /// Source for a store track, reading file-backed tracks through htslib.
    pub fn for_track(
        info: &TrackInfo,
        store: Arc<dyn TrackStore>,
        reference: Option<Arc<dyn ReferenceSource>>,
        soft_clips_as_mismatches: bool,
    ) -> Self {
        match &info.file_path {
            Some(path) => Self::file(
                info.id,
                &info.chromosome,
                Arc::new(BamFile::new(path.clone())),
                reference,
                soft_clips_as_mismatches,
            ),
            None => Self::store(store, info.id),
        }
    }

    pub fn track_id(&self) -> TrackId {
        match self {
            TrackSource::Store { track_id, .. } => *track_id,
            TrackSource::File(file) => file.track_id,
        }
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self, TrackSource::File(_))
    }

    pub fn reference_length(&self) -> Result<i64> {
        match self {
            TrackSource::Store { store, track_id } => store.reference_length(*track_id),
            TrackSource::File(file) => file.alignments.reference_length(&file.chromosome),
        }
    }

    /// Coverage of exactly `[from, to]`. Store coverage is already bucketed by
    /// class; the read-class filter applies to file-backed records.
    pub fn coverage(&mut self, from: i64, to: i64, read_classes: &ReadClassParams) -> Result<Coverage> {
        match self {
            TrackSource::Store { store, track_id } => store.fetch_coverage(*track_id, from, to),
            TrackSource::File(file) => {
                let records = file.records(from, to)?;
                reconstruct::coverage_from_records(
                    &records,
                    from,
                    to,
                    read_classes,
                    file.soft_clips_as_mismatches,
                )
            }
        }
    }

    pub fn read_starts(&mut self, from: i64, to: i64, read_classes: &ReadClassParams) -> Result<Coverage> {
        match self {
            TrackSource::Store { store, track_id } => {
                let rows = store.fetch_mappings(*track_id, from, to, false)?;
                let mut coverage = Coverage::new(from, to)?;
                for mapping in assemble_mappings(rows, *track_id, read_classes)? {
                    let position = if mapping.is_forward_strand {
                        mapping.start
                    } else {
                        mapping.stop
                    };
                    coverage.add(
                        position,
                        MappingClass::classify(mapping.num_errors, mapping.is_best_mapping),
                        mapping.is_forward_strand,
                        mapping.replicate_count,
                    );
                }
                Ok(coverage)
            }
            TrackSource::File(file) => {
                let records = file.records(from, to)?;
                reconstruct::read_starts_from_records(&records, from, to, read_classes)
            }
        }
    }

    /// Mappings overlapping `[from, to]` passing the read-class filter.
    pub fn mappings(
        &mut self,
        from: i64,
        to: i64,
        read_classes: &ReadClassParams,
        with_diffs: bool,
    ) -> Result<Vec<Mapping>> {
        match self {
            TrackSource::Store { store, track_id } => {
                let rows = store.fetch_mappings(*track_id, from, to, with_diffs)?;
                assemble_mappings(rows, *track_id, read_classes)
            }
            TrackSource::File(file) => file.mappings(from, to, read_classes, with_diffs, false),
        }
    }

    /// Mappings whose alignment starts in `[from, to]`, so adjacent windows of
    /// a sweep never deliver the same mapping twice.
    pub fn mappings_starting_in(
        &mut self,
        from: i64,
        to: i64,
        read_classes: &ReadClassParams,
        with_diffs: bool,
    ) -> Result<Vec<Mapping>> {
        match self {
            TrackSource::Store { .. } => {
                let mut mappings = self.mappings(from, to, read_classes, with_diffs)?;
                mappings.retain(|m| m.start >= from && m.start <= to);
                Ok(mappings)
            }
            TrackSource::File(file) => file.mappings(from, to, read_classes, with_diffs, true),
        }
    }

    /// Mappings with ids in `[from_id, to_id]`. File-backed tracks have no ids.
    pub fn mappings_by_id(
        &mut self,
        from_id: u64,
        to_id: u64,
        read_classes: &ReadClassParams,
        with_diffs: bool,
    ) -> Result<Vec<Mapping>> {
        match self {
            TrackSource::Store { store, track_id } => {
                let rows = store.fetch_mappings_by_id(*track_id, from_id, to_id, with_diffs)?;
                assemble_mappings(rows, *track_id, read_classes)
            }
            TrackSource::File(file) => Err(Error::Store(format!(
                "track {} is file-backed and has no mapping ids",
                file.track_id
            ))),
        }
    }
}

impl FileTrack {
    fn records(&self, from: i64, to: i64) -> Result<Vec<AlignmentRecord>> {
        // windows may extend beyond the reference start
        if to < 1 {
            return Ok(Vec::new());
        }
        self.alignments
            .query_overlapping(&self.chromosome, from.max(1), to)
    }

    fn mappings(
        &self,
        from: i64,
        to: i64,
        read_classes: &ReadClassParams,
        with_diffs: bool,
        starts_only: bool,
    ) -> Result<Vec<Mapping>> {
        let mut records = self.records(from, to)?;
        if starts_only {
            records.retain(|r| r.start >= from && r.start <= to);
        }
        let reference = match (&self.reference, with_diffs) {
            (Some(reference), true) if !records.is_empty() => {
                let first = records.iter().map(|r| r.start).min().unwrap_or(from).max(1);
                let last = records.iter().map(|r| r.stop).max().unwrap_or(to).max(first);
                Some(reference.fetch(&self.chromosome, first, last)?)
            }
            _ => None,
        };
        let mappings = reconstruct::mappings_from_records(
            &records,
            self.track_id,
            read_classes,
            reference.as_ref(),
            with_diffs,
            self.soft_clips_as_mismatches,
        )?;
        debug!(
            "Built {} mappings for track {} at {}:{}-{}",
            mappings.len(),
            self.track_id,
            self.chromosome,
            from,
            to
        );
        Ok(mappings)
    }
}
