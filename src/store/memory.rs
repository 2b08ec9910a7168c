// src/store/memory.rs
//! In-memory track store with interval trees over mapping extents and a
//! BGZF-compressed bincode snapshot format.

use super::{DiffKind, DiffRow, JoinedRow, MappingRow, TrackInfo, TrackStore};
use crate::coverage::{ClassCounts, Coverage};
use crate::error::{Error, Result};
use crate::mapping::{MappingClass, TrackId};
use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::{debug, info};
use noodles::bgzf;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

type MappingTree = BasicCOITree<u32, u32>;

const MAGIC: &[u8] = b"RXSTORE1";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTrack {
    info: TrackInfo,
    coverage: ClassCounts,
    /// Sorted by id
    mappings: Vec<MappingRow>,
    diffs: FxHashMap<u64, Vec<DiffRow>>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    next_mapping_id: u64,
    tracks: Vec<&'a StoredTrack>,
}

#[derive(Deserialize)]
struct Snapshot {
    next_mapping_id: u64,
    tracks: Vec<StoredTrack>,
}

/// A mapping to add to a track, with its diffs. Ids are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub row: MappingRow,
    pub diffs: Vec<DiffRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tracks: BTreeMap<TrackId, StoredTrack>,
    next_mapping_id: u64,
    trees: RwLock<FxHashMap<TrackId, Arc<MappingTree>>>,
}

fn to_tree_coord(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_track_id(&self) -> TrackId {
        self.tracks.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Materialize a track. Mappings are ordered by start and receive ids
    /// following all ids of previously added tracks; coverage is computed from
    /// them.
    pub fn add_track(
        &mut self,
        name: &str,
        chromosome: &str,
        reference_length: i64,
        mut mappings: Vec<NewMapping>,
    ) -> Result<TrackId> {
        let id = self.next_track_id();
        mappings.sort_by_key(|m| (m.row.start, m.row.stop));

        let mut coverage = ClassCounts::zeroed(reference_length.max(0) as usize)?;
        let mut rows = Vec::new();
        rows.try_reserve_exact(mappings.len())?;
        let mut diffs: FxHashMap<u64, Vec<DiffRow>> = FxHashMap::default();

        for NewMapping { mut row, diffs: mapping_diffs } in mappings {
            self.next_mapping_id += 1;
            row.id = self.next_mapping_id;

            let class = MappingClass::classify(row.num_errors, row.is_best_mapping);
            let from = row.start.max(1);
            let to = row.stop.min(reference_length);
            for position in from..=to {
                coverage.add(
                    (position - 1) as usize,
                    class,
                    row.is_forward_strand,
                    row.replicate_count,
                );
            }

            if !mapping_diffs.is_empty() {
                let entry = diffs.entry(row.id).or_default();
                entry.extend(mapping_diffs.into_iter().map(|mut diff| {
                    diff.mapping_id = row.id;
                    diff
                }));
            }
            rows.push(row);
        }

        info!(
            "Stored track {} '{}' with {} mappings on {} ({} bp)",
            id,
            name,
            rows.len(),
            chromosome,
            reference_length
        );
        self.tracks.insert(
            id,
            StoredTrack {
                info: TrackInfo {
                    id,
                    name: name.to_string(),
                    chromosome: chromosome.to_string(),
                    reference_length,
                    file_path: None,
                },
                coverage,
                mappings: rows,
                diffs,
            },
        );
        Ok(id)
    }

    /// Register a track whose data stays in an alignment file.
    pub fn add_file_track(
        &mut self,
        name: &str,
        chromosome: &str,
        reference_length: i64,
        file_path: &str,
    ) -> TrackId {
        let id = self.next_track_id();
        self.tracks.insert(
            id,
            StoredTrack {
                info: TrackInfo {
                    id,
                    name: name.to_string(),
                    chromosome: chromosome.to_string(),
                    reference_length,
                    file_path: Some(file_path.to_string()),
                },
                coverage: ClassCounts::default(),
                mappings: Vec::new(),
                diffs: FxHashMap::default(),
            },
        );
        id
    }

    fn stored(&self, track_id: TrackId) -> Result<&StoredTrack> {
        self.tracks
            .get(&track_id)
            .ok_or(Error::UnknownTrack(track_id))
    }

    /// Get the interval tree of a track, building it on first use
    fn get_or_build_tree(&self, track_id: TrackId) -> Result<Arc<MappingTree>> {
        if let Some(tree) = self
            .trees
            .read()
            .map_err(|_| Error::Store("tree cache lock poisoned".to_string()))?
            .get(&track_id)
        {
            return Ok(Arc::clone(tree));
        }

        let track = self.stored(track_id)?;
        let intervals: Vec<Interval<u32>> = track
            .mappings
            .iter()
            .enumerate()
            .map(|(idx, row)| Interval {
                first: to_tree_coord(row.start),
                last: to_tree_coord(row.stop),
                metadata: idx as u32,
            })
            .collect();
        let tree = Arc::new(BasicCOITree::new(intervals.as_slice()));
        debug!("Built interval tree for track {} ({} mappings)", track_id, intervals.len());

        self.trees
            .write()
            .map_err(|_| Error::Store("tree cache lock poisoned".to_string()))?
            .insert(track_id, Arc::clone(&tree));
        Ok(tree)
    }

    fn join_rows<'a>(
        track: &StoredTrack,
        rows: impl Iterator<Item = &'a MappingRow>,
        with_diffs: bool,
    ) -> Result<Vec<JoinedRow>> {
        let mut joined = Vec::new();
        for row in rows {
            match track.diffs.get(&row.id) {
                Some(diffs) if with_diffs => {
                    joined.try_reserve(diffs.len())?;
                    joined.extend(diffs.iter().map(|diff| (row.clone(), Some(diff.clone()))));
                }
                _ => {
                    joined.try_reserve(1)?;
                    joined.push((row.clone(), None));
                }
            }
        }
        Ok(joined)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = bgzf::io::Writer::new(File::create(path)?);
        writer.write_all(MAGIC)?;
        let snapshot = SnapshotRef {
            next_mapping_id: self.next_mapping_id,
            tracks: self.tracks.values().collect(),
        };
        bincode::serde::encode_into_std_write(&snapshot, &mut writer, bincode::config::standard())?;
        writer.try_finish()?;
        info!("Saved {} tracks to '{}'", self.tracks.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = bgzf::io::Reader::new(File::open(path)?);
        let mut magic_buf = [0u8; 8];
        reader.read_exact(&mut magic_buf)?;
        if magic_buf != MAGIC {
            return Err(Error::Serialization(format!(
                "'{}' is not a track store snapshot",
                path.display()
            )));
        }
        let snapshot: Snapshot =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        info!("Loaded {} tracks from '{}'", snapshot.tracks.len(), path.display());
        Ok(Self {
            tracks: snapshot
                .tracks
                .into_iter()
                .map(|track| (track.info.id, track))
                .collect(),
            next_mapping_id: snapshot.next_mapping_id,
            trees: RwLock::new(FxHashMap::default()),
        })
    }
}

impl TrackStore for MemoryStore {
    fn tracks(&self) -> Result<Vec<TrackInfo>> {
        Ok(self.tracks.values().map(|track| track.info.clone()).collect())
    }

    fn track(&self, track_id: TrackId) -> Result<TrackInfo> {
        Ok(self.stored(track_id)?.info.clone())
    }

    fn fetch_coverage(&self, track_id: TrackId, from: i64, to: i64) -> Result<Coverage> {
        if from > to {
            return Err(Error::InvalidInterval { from, to });
        }
        let track = self.stored(track_id)?;
        let width = (to - from + 1) as usize;
        let mut counts = ClassCounts::zeroed(width)?;

        let stored_len = track.coverage.len() as i64;
        let first = from.max(1);
        let last = to.min(stored_len);
        if first <= last {
            counts.copy_range(
                (first - from) as usize,
                &track.coverage,
                (first - 1) as usize,
                (last - first + 1) as usize,
            );
        }
        Coverage::from_counts(from, to, counts)
    }

    fn fetch_mappings(
        &self,
        track_id: TrackId,
        from: i64,
        to: i64,
        with_diffs: bool,
    ) -> Result<Vec<JoinedRow>> {
        if from > to {
            return Err(Error::InvalidInterval { from, to });
        }
        let track = self.stored(track_id)?;
        let tree = self.get_or_build_tree(track_id)?;
        let mut hits: Vec<u32> = Vec::new();
        tree.query(to_tree_coord(from), to_tree_coord(to), |interval| {
            hits.push(interval.metadata.clone());
        });
        hits.sort_unstable();
        Self::join_rows(
            track,
            hits.iter().map(|&idx| &track.mappings[idx as usize]),
            with_diffs,
        )
    }

    fn fetch_mappings_by_id(
        &self,
        track_id: TrackId,
        from_id: u64,
        to_id: u64,
        with_diffs: bool,
    ) -> Result<Vec<JoinedRow>> {
        let track = self.stored(track_id)?;
        let first = track.mappings.partition_point(|row| row.id < from_id);
        let last = track.mappings.partition_point(|row| row.id <= to_id);
        let rows = if first < last {
            &track.mappings[first..last]
        } else {
            &[][..]
        };
        Self::join_rows(track, rows.iter(), with_diffs)
    }

    fn count_unique_mappings(&self, track_id: TrackId) -> Result<u64> {
        Ok(self.stored(track_id)?.mappings.len() as u64)
    }

    fn reference_length(&self, track_id: TrackId) -> Result<i64> {
        Ok(self.stored(track_id)?.info.reference_length)
    }
}

/// Diff row helper for building tracks.
pub fn substitution(position: i64, base: u8, is_forward_strand: bool, replicate_count: u32) -> DiffRow {
    DiffRow {
        mapping_id: 0,
        position,
        base,
        is_forward_strand,
        replicate_count,
        kind: DiffKind::Substitution,
    }
}

/// Gap row helper for building tracks.
pub fn gap(position: i64, base: u8, order: u32, is_forward_strand: bool, replicate_count: u32) -> DiffRow {
    DiffRow {
        mapping_id: 0,
        position,
        base,
        is_forward_strand,
        replicate_count,
        kind: DiffKind::Gap { order },
    }
}
