use crate::error::Result;
use crate::store::{TrackInfo, TrackStore};
use rayon::prelude::*;
use std::io::{self, Write};

pub struct TrackSummary {
    pub info: TrackInfo,
    pub mappings: u64,
    /// Positions with non-zero coverage; unknown for file-backed tracks
    pub covered_bases: Option<u64>,
}

fn summarize(store: &dyn TrackStore, info: TrackInfo) -> Result<TrackSummary> {
    if info.is_file_backed() {
        return Ok(TrackSummary {
            info,
            mappings: 0,
            covered_bases: None,
        });
    }
    let mappings = store.count_unique_mappings(info.id)?;
    let covered_bases = if info.reference_length > 0 {
        let coverage = store.fetch_coverage(info.id, 1, info.reference_length)?;
        (1..=info.reference_length)
            .filter(|&position| coverage.total_at(position).unwrap_or(0) > 0)
            .count() as u64
    } else {
        0
    };
    Ok(TrackSummary {
        info,
        mappings,
        covered_bases: Some(covered_bases),
    })
}

/// Summaries of all tracks in natural name order.
pub fn track_summaries(store: &dyn TrackStore) -> Result<Vec<TrackSummary>> {
    let mut tracks = store.tracks()?;
    tracks.sort_by(|a, b| natord::compare(&a.name, &b.name));
    tracks
        .into_par_iter()
        .map(|info| summarize(store, info))
        .collect()
}

pub fn write_summaries<W: Write>(out: &mut W, summaries: &[TrackSummary]) -> io::Result<()> {
    writeln!(out, "#id\tname\tchromosome\tlength\tmappings\tcovered_bases\tsource")?;
    for summary in summaries {
        let info = &summary.info;
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            info.id,
            info.name,
            info.chromosome,
            info.reference_length,
            summary.mappings,
            summary
                .covered_bases
                .map_or_else(|| ".".to_string(), |bases| bases.to_string()),
            info.file_path.as_deref().unwrap_or("store")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, NewMapping};
    use crate::store::MappingRow;

    fn new_mapping(start: i64, stop: i64) -> NewMapping {
        NewMapping {
            row: MappingRow {
                id: 0,
                start,
                stop,
                is_forward_strand: true,
                replicate_count: 1,
                num_errors: 0,
                sequence_id: None,
                is_best_mapping: true,
                mapping_count: 1,
            },
            diffs: Vec::new(),
        }
    }

    #[test]
    fn test_natural_order_and_counts() {
        let mut store = MemoryStore::new();
        store.add_track("sample10", "chr1", 100, vec![new_mapping(1, 10)]).unwrap();
        store
            .add_track("sample2", "chr1", 100, vec![new_mapping(5, 14), new_mapping(10, 19)])
            .unwrap();
        store.add_file_track("sample1", "chr1", 100, "/data/sample1.bam");

        let summaries = track_summaries(&store).unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.info.name.as_str()).collect();
        assert_eq!(names, vec!["sample1", "sample2", "sample10"]);
        assert_eq!(summaries[1].mappings, 2);
        assert_eq!(summaries[1].covered_bases, Some(15));
        assert_eq!(summaries[0].covered_bases, None);

        let mut out = Vec::new();
        write_summaries(&mut out, &summaries).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("3\tsample1\tchr1\t100\t0\t.\t/data/sample1.bam"));
    }
}
