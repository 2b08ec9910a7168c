//! Coverage and diff reconstruction for file-backed tracks.
//!
//! Nothing is pre-materialized for a file-backed track: every request scans the
//! alignment records overlapping the interval and interprets their CIGAR
//! operations. Counts are accumulated with replicate multiplicity.

use crate::alignment_record::AlignmentRecord;
use crate::cigar::{parse_cigar, reference_length, CigarOp};
use crate::coverage::Coverage;
use crate::error::Result;
use crate::mapping::{Diff, Mapping, ReferenceGap, TrackId, DELETION_BASE};
use crate::request::ReadClassParams;
use log::debug;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};

/// Reference bases of `[start, start + bases.len() - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceWindow {
    pub start: i64,
    pub bases: Vec<u8>,
}

impl ReferenceWindow {
    pub fn new(start: i64, mut bases: Vec<u8>) -> Self {
        bases.make_ascii_uppercase();
        Self { start, bases }
    }

    pub fn base_at(&self, position: i64) -> Option<u8> {
        if position < self.start {
            return None;
        }
        self.bases.get((position - self.start) as usize).copied()
    }
}

/// Reference-consuming blocks (inclusive) that count towards coverage.
fn covered_blocks(start: i64, ops: &[CigarOp], soft_clips_as_mismatches: bool) -> Vec<(i64, i64)> {
    let mut blocks = Vec::new();
    let mut ref_pos = start;
    let mut seen_aligned = false;
    for op in ops {
        let len = op.len() as i64;
        match op.op() {
            'M' | '=' | 'X' | 'D' if len > 0 => {
                blocks.push((ref_pos, ref_pos + len - 1));
                seen_aligned = true;
            }
            'S' if soft_clips_as_mismatches && len > 0 => {
                if seen_aligned {
                    blocks.push((ref_pos, ref_pos + len - 1));
                } else {
                    blocks.push(((ref_pos - len).max(1), ref_pos - 1));
                }
            }
            _ => {}
        }
        ref_pos += op.ref_delta();
    }
    blocks.retain(|(from, to)| from <= to);
    blocks
}

/// Coverage of `[from, to]` from the records passing the read-class filter.
pub fn coverage_from_records(
    records: &[AlignmentRecord],
    from: i64,
    to: i64,
    read_classes: &ReadClassParams,
    soft_clips_as_mismatches: bool,
) -> Result<Coverage> {
    let mut coverage = Coverage::new(from, to)?;
    for record in records {
        if !read_classes.accepts(record.errors(), record.class().is_best(), record.mappings()) {
            continue;
        }
        let class = record.class();
        let is_forward = record.is_forward();
        let count = record.replicates();
        match parse_cigar(&record.cigar) {
            Ok(ops) => {
                for (block_from, block_to) in covered_blocks(record.start, &ops, soft_clips_as_mismatches) {
                    coverage.add_range(block_from, block_to, class, is_forward, count);
                }
            }
            Err(e) => {
                debug!("{e}; counting record at {} as full match", record.start);
                coverage.add_range(record.start, record.stop, class, is_forward, count);
            }
        }
    }
    Ok(coverage)
}

/// Read-start counts of `[from, to]`: forward reads count at their start,
/// reverse reads at their stop.
pub fn read_starts_from_records(
    records: &[AlignmentRecord],
    from: i64,
    to: i64,
    read_classes: &ReadClassParams,
) -> Result<Coverage> {
    let mut coverage = Coverage::new(from, to)?;
    for record in records {
        if !read_classes.accepts(record.errors(), record.class().is_best(), record.mappings()) {
            continue;
        }
        let position = if record.is_forward() {
            record.start
        } else {
            record.stop
        };
        coverage.add(position, record.class(), record.is_forward(), record.replicates());
    }
    Ok(coverage)
}

/// Append the diffs and reference gaps described by `ops` to `mapping`.
///
/// Returns the mapping extent including soft clipped bases when those count
/// as mismatches.
fn add_diffs_and_gaps(
    mapping: &mut Mapping,
    record: &AlignmentRecord,
    ops: &[CigarOp],
    reference: Option<&ReferenceWindow>,
    soft_clips_as_mismatches: bool,
) -> (i64, i64) {
    let is_forward = record.is_forward();
    let replicates = record.replicates();
    let read_base = |idx: usize| -> u8 {
        record
            .read_sequence
            .get(idx)
            .map(u8::to_ascii_uppercase)
            .unwrap_or(b'N')
    };

    let mut extent = (record.start, record.start + reference_length(ops) - 1);
    let mut ref_pos = record.start;
    let mut read_pos = 0usize;
    let mut seen_aligned = false;
    // reset per record: insertion order per anchoring reference position
    let mut gap_orders: FxHashMap<i64, u32> = FxHashMap::default();

    for op in ops {
        let len = op.len() as usize;
        match op.op() {
            kind @ ('M' | '=' | 'X') => {
                for k in 0..len {
                    let position = ref_pos + k as i64;
                    let base = read_base(read_pos + k);
                    let mismatch = match kind {
                        'X' => true,
                        '=' => false,
                        _ => {
                            base == b'N'
                                || reference
                                    .and_then(|r| r.base_at(position))
                                    .is_some_and(|ref_base| ref_base != base)
                        }
                    };
                    if mismatch {
                        mapping.add_diff(Diff {
                            position,
                            base,
                            is_forward_strand: is_forward,
                            replicate_count: replicates,
                        });
                    }
                }
                seen_aligned = true;
            }
            'D' => {
                for k in 0..len {
                    mapping.add_diff(Diff {
                        position: ref_pos + k as i64,
                        base: DELETION_BASE,
                        is_forward_strand: is_forward,
                        replicate_count: replicates,
                    });
                }
                seen_aligned = true;
            }
            'I' => {
                for k in 0..len {
                    let order = gap_orders.entry(ref_pos).or_insert(0);
                    mapping.add_gap(ReferenceGap {
                        position: ref_pos,
                        base: read_base(read_pos + k),
                        gap_order: *order,
                        is_forward_strand: is_forward,
                        replicate_count: replicates,
                    });
                    *order += 1;
                }
            }
            'S' if soft_clips_as_mismatches => {
                // leading clips sit upstream of the first aligned base
                let first = if seen_aligned {
                    ref_pos
                } else {
                    ref_pos - len as i64
                };
                for k in 0..len {
                    let position = first + k as i64;
                    if position < 1 {
                        continue;
                    }
                    mapping.add_diff(Diff {
                        position,
                        base: read_base(read_pos + k),
                        is_forward_strand: is_forward,
                        replicate_count: replicates,
                    });
                    extent = (extent.0.min(position), extent.1.max(position));
                }
            }
            _ => {}
        }
        ref_pos += op.ref_delta();
        read_pos += op.read_delta();
    }
    extent
}

/// Build a mapping from one alignment record.
///
/// A record whose CIGAR cannot be parsed is kept as a full match without diffs.
pub fn mapping_from_record(
    record: &AlignmentRecord,
    id: u64,
    track_id: TrackId,
    reference: Option<&ReferenceWindow>,
    with_diffs: bool,
    soft_clips_as_mismatches: bool,
) -> Mapping {
    let class = record.class();
    let mut mapping = Mapping {
        id,
        start: record.start,
        stop: record.stop,
        track_id,
        is_forward_strand: record.is_forward(),
        replicate_count: record.replicates(),
        num_errors: record.errors(),
        sequence_id: None,
        is_best_mapping: class.is_best(),
        mapping_count: record.mappings(),
        diffs: Vec::new(),
        gaps: Vec::new(),
    };
    if !with_diffs {
        return mapping;
    }
    match parse_cigar(&record.cigar) {
        Ok(ops) if !ops.is_empty() => {
            let (start, stop) =
                add_diffs_and_gaps(&mut mapping, record, &ops, reference, soft_clips_as_mismatches);
            mapping.start = start;
            mapping.stop = stop.max(start);
            if record.num_errors.is_none() {
                let indels_and_mismatches = (mapping.diffs.len() + mapping.gaps.len()) as u32;
                mapping.num_errors = indels_and_mismatches;
            }
        }
        Ok(_) => {}
        Err(e) => debug!("{e}; keeping record at {} as full match", record.start),
    }
    mapping
}

/// Id of a file record. Records sharing start, stop and strand are told apart
/// by `ordinal`, their rank among those records in file order, so a read keeps
/// its id in every window that returns it.
pub fn record_mapping_id(record: &AlignmentRecord, ordinal: u32) -> u64 {
    let mut hasher = FxHasher::default();
    (record.start, record.stop, record.is_forward(), ordinal).hash(&mut hasher);
    hasher.finish()
}

/// Mappings of the records passing the read-class filter, with ids from
/// [`record_mapping_id`].
#[allow(clippy::too_many_arguments)]
pub fn mappings_from_records(
    records: &[AlignmentRecord],
    track_id: TrackId,
    read_classes: &ReadClassParams,
    reference: Option<&ReferenceWindow>,
    with_diffs: bool,
    soft_clips_as_mismatches: bool,
) -> Result<Vec<Mapping>> {
    let mut mappings = Vec::new();
    mappings.try_reserve(records.len())?;
    let mut ordinals: FxHashMap<(i64, i64, bool), u32> = FxHashMap::default();
    for record in records {
        let ordinal = ordinals
            .entry((record.start, record.stop, record.is_forward()))
            .or_insert(0);
        let id = record_mapping_id(record, *ordinal);
        *ordinal += 1;
        if !read_classes.accepts(record.errors(), record.class().is_best(), record.mappings()) {
            continue;
        }
        mappings.push(mapping_from_record(
            record,
            id,
            track_id,
            reference,
            with_diffs,
            soft_clips_as_mismatches,
        ));
    }
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_record::Strand;
    use crate::mapping::MappingClass;

    fn record(start: i64, cigar: &str, seq: &[u8]) -> AlignmentRecord {
        let span = parse_cigar(cigar).map(|ops| reference_length(&ops)).unwrap_or(seq.len() as i64);
        AlignmentRecord {
            start,
            stop: start + span - 1,
            strand: Strand::Forward,
            cigar: cigar.to_string(),
            read_sequence: seq.to_vec(),
            classification: None,
            replicate_count: None,
            num_errors: None,
            mapping_count: None,
        }
    }

    #[test]
    fn test_two_insertions_same_position_are_ordered() {
        let rec = record(100, "3M2I3M", b"ACGTTACG");
        let mapping = mapping_from_record(&rec, 1, 0, None, true, false);
        assert_eq!(mapping.gaps.len(), 2);
        assert_eq!(mapping.gaps[0].position, 103);
        assert_eq!(mapping.gaps[0].gap_order, 0);
        assert_eq!(mapping.gaps[0].base, b'T');
        assert_eq!(mapping.gaps[1].position, 103);
        assert_eq!(mapping.gaps[1].gap_order, 1);
        assert_eq!(mapping.gaps[1].base, b'T');
        assert!(mapping.diffs.is_empty());
        assert_eq!((mapping.start, mapping.stop), (100, 105));
    }

    #[test]
    fn test_deletions_use_sentinel_and_shift_positions() {
        let reference = ReferenceWindow::new(1, b"AAAAACCCCCGGGGG".to_vec());
        // 3 matches, 2 deleted bases, then a mismatch at position 6
        let rec = record(1, "3M2D3M", b"AAATCC");
        let mapping = mapping_from_record(&rec, 1, 0, Some(&reference), true, false);
        let deleted: Vec<i64> = mapping
            .diffs
            .iter()
            .filter(|d| d.base == DELETION_BASE)
            .map(|d| d.position)
            .collect();
        assert_eq!(deleted, vec![4, 5]);
        let mismatches: Vec<(i64, u8)> = mapping
            .diffs
            .iter()
            .filter(|d| d.base != DELETION_BASE)
            .map(|d| (d.position, d.base))
            .collect();
        assert_eq!(mismatches, vec![(6, b'T')]);
        assert_eq!(mapping.stop, 8);
        assert_eq!(mapping.num_errors, 3);
        for diff in &mapping.diffs {
            assert!(diff.position >= mapping.start && diff.position <= mapping.stop);
        }
    }

    #[test]
    fn test_explicit_mismatch_and_ambiguous_bases() {
        let rec = record(10, "2=1X2M", b"ACGNT");
        let mapping = mapping_from_record(&rec, 1, 0, None, true, false);
        let positions: Vec<i64> = mapping.diffs.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![12, 13]);
    }

    #[test]
    fn test_soft_clips_become_mismatches() {
        let rec = record(10, "2S4M1S", b"GGACGTC");
        let mapping = mapping_from_record(&rec, 1, 0, None, true, true);
        let positions: Vec<i64> = mapping.diffs.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![8, 9, 14]);
        assert_eq!((mapping.start, mapping.stop), (8, 14));

        let plain = mapping_from_record(&rec, 1, 0, None, true, false);
        assert!(plain.diffs.is_empty());
        assert_eq!((plain.start, plain.stop), (10, 13));
    }

    #[test]
    fn test_malformed_cigar_counts_as_full_match() {
        let mut rec = record(5, "10M", b"ACGTACGTAC");
        rec.cigar = "1OM".to_string();
        let mapping = mapping_from_record(&rec, 1, 0, None, true, false);
        assert!(!mapping.has_diffs());
        assert_eq!((mapping.start, mapping.stop), (5, 14));

        let cov = coverage_from_records(&[rec], 1, 20, &ReadClassParams::default(), false).unwrap();
        assert_eq!(cov.total_at(5), Some(1));
        assert_eq!(cov.total_at(14), Some(1));
        assert_eq!(cov.total_at(15), Some(0));
    }

    #[test]
    fn test_coverage_uses_replicates_and_inclusive_classes() {
        let mut perfect = record(1, "5M", b"AAAAA");
        perfect.num_errors = Some(0);
        perfect.replicate_count = Some(5);
        let mut common = record(3, "2M1I2M", b"AAAAA");
        common.classification = Some(MappingClass::Common);
        common.strand = Strand::Reverse;

        let cov =
            coverage_from_records(&[perfect, common], 1, 10, &ReadClassParams::default(), false).unwrap();
        let counts = cov.counts();
        assert_eq!(counts.perfect_fwd[0..5], [5, 5, 5, 5, 5]);
        for idx in 0..cov.width() {
            assert!(counts.best_fwd[idx] >= counts.perfect_fwd[idx]);
            assert!(counts.common_fwd[idx] >= counts.perfect_fwd[idx]);
            assert!(counts.common_rev[idx] >= counts.best_rev[idx]);
        }
        // insertion does not consume reference: reverse read covers 3..=6
        assert_eq!(counts.common_rev[2..7], [1, 1, 1, 1, 0]);
        assert_eq!(counts.best_rev[2], 0);
    }

    #[test]
    fn test_coverage_respects_read_classes() {
        let mut perfect = record(1, "4M", b"AAAA");
        perfect.num_errors = Some(0);
        let mut common = record(1, "4M", b"AAAA");
        common.classification = Some(MappingClass::Common);
        common.num_errors = Some(2);
        let only_common = ReadClassParams::new(false, false, true, false);
        let cov = coverage_from_records(&[perfect, common], 1, 4, &only_common, false).unwrap();
        assert_eq!(cov.counts().common_fwd, vec![1, 1, 1, 1]);
        assert_eq!(cov.counts().perfect_fwd, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_read_starts() {
        let fwd = record(2, "3M", b"AAA");
        let mut rev = record(2, "3M", b"AAA");
        rev.strand = Strand::Reverse;
        let cov = read_starts_from_records(&[fwd, rev], 1, 5, &ReadClassParams::default()).unwrap();
        assert_eq!(cov.counts().common_fwd, vec![0, 1, 0, 0, 0]);
        assert_eq!(cov.counts().common_rev, vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_mapping_ids_are_stable_across_windows() {
        let mut records = vec![record(1, "3M", b"AAA"), record(1, "3M", b"AAA"), record(4, "3M", b"AAA")];
        records[0].num_errors = Some(0);
        records[1].num_errors = Some(1);
        records[2].num_errors = Some(0);
        let whole =
            mappings_from_records(&records, 7, &ReadClassParams::default(), None, false, false)
                .unwrap();
        let ids: Vec<u64> = whole.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 3);
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert!(whole.iter().all(|m| m.track_id == 7));

        // a later window returning only the last read gives it the same id
        let tail = mappings_from_records(&records[2..], 7, &ReadClassParams::default(), None, false, false)
            .unwrap();
        assert_eq!(tail[0].id, ids[2]);

        // filtered reads still take their rank among identical reads
        let exact = ReadClassParams::new(true, false, false, false);
        let filtered = mappings_from_records(&records, 7, &exact, None, false, false).unwrap();
        assert_eq!(filtered.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[0], ids[2]]);
    }
}
