// src/threads/mapping_thread.rs
use super::request_thread::{LatestRequest, RequestHandler, RequestThread};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::mapping::Mapping;
use crate::request::{DesiredData, IntervalRequest, RequestData};
use crate::source::TrackSource;
use log::debug;

/// Viewport mapping worker. Requests that are no longer near the latest
/// request are skipped.
pub struct MappingThread {
    source: TrackSource,
    config: EngineConfig,
}

impl MappingThread {
    pub fn new(source: TrackSource, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn start(self, name: &str) -> Result<RequestThread> {
        let poll_interval = self.config.poll_interval;
        RequestThread::spawn(name, self, poll_interval)
    }

    fn load(&mut self, request: &IntervalRequest) -> Result<RequestData> {
        let (from, to) = (request.total_from(), request.total_to());
        let read_classes = request.read_classes();
        let desired = request.desired();
        let data = match desired {
            DesiredData::ReducedMappings => {
                let mappings = self.source.mappings(from, to, read_classes, false)?;
                RequestData::ReducedMappings {
                    mappings: mappings.iter().map(Mapping::reduce).collect(),
                    from,
                    to,
                }
            }
            DesiredData::MappingsWithoutDiffs => RequestData::Mappings {
                mappings: self.source.mappings(from, to, read_classes, false)?,
                from,
                to,
                desired,
            },
            // everything else is shown with its diffs
            _ => {
                // reads reaching into the interval from either side carry diffs
                // that are visible in it
                let widened_from = (from - self.config.fixed_interval_length).max(1);
                let widened_to = to + self.config.fixed_interval_length;
                RequestData::Mappings {
                    mappings: self.source.mappings(widened_from, widened_to, read_classes, true)?,
                    from,
                    to,
                    desired,
                }
            }
        };
        Ok(data)
    }
}

impl RequestHandler for MappingThread {
    fn handle(&mut self, request: &IntervalRequest, latest: &LatestRequest) -> Result<()> {
        if !latest.matches(request) {
            debug!(
                "Skipping stale mapping request {}-{}",
                request.total_from(),
                request.total_to()
            );
            return Ok(());
        }
        let data = self.load(request)?;
        request.sender().receive_data(data);
        Ok(())
    }
}

/// Mapping worker for analysis sweeps. Every request is executed.
///
/// For store-backed tracks the request bounds are mapping ids. For file-backed
/// tracks they are positions and only mappings starting in the interval are
/// returned, so consecutive windows never share a mapping.
pub struct MappingThreadAnalyses {
    source: TrackSource,
    config: EngineConfig,
}

impl MappingThreadAnalyses {
    pub fn new(source: TrackSource, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn start(self, name: &str) -> Result<RequestThread> {
        let poll_interval = self.config.poll_interval;
        RequestThread::spawn(name, self, poll_interval)
    }

    fn load(&mut self, request: &IntervalRequest) -> Result<Vec<Mapping>> {
        let (from, to) = (request.from(), request.to());
        let read_classes = request.read_classes();
        let with_diffs = !matches!(
            request.desired(),
            DesiredData::MappingsWithoutDiffs | DesiredData::ReducedMappings
        );
        if self.source.is_file_backed() {
            self.source
                .mappings_starting_in(from, to, read_classes, with_diffs)
        } else {
            self.source.mappings_by_id(
                from.max(0) as u64,
                to.max(0) as u64,
                read_classes,
                with_diffs,
            )
        }
    }
}

impl RequestHandler for MappingThreadAnalyses {
    fn handle(&mut self, request: &IntervalRequest, _latest: &LatestRequest) -> Result<()> {
        let mappings = self.load(request)?;
        let (from, to) = (request.from(), request.to());
        let data = match request.desired() {
            DesiredData::ReducedMappings => RequestData::ReducedMappings {
                mappings: mappings.iter().map(Mapping::reduce).collect(),
                from,
                to,
            },
            desired => RequestData::Mappings {
                mappings,
                from,
                to,
                desired,
            },
        };
        request.sender().receive_data(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment_record::{AlignmentRecord, Strand};
    use crate::bam::AlignmentSource;
    use crate::request::tests::Collector;
    use crate::request::{ReadClassParams, ThreadListener};
    use crate::store::memory::{substitution, MemoryStore, NewMapping};
    use crate::store::MappingRow;
    use std::sync::Arc;

    fn new_mapping(start: i64, stop: i64) -> NewMapping {
        NewMapping {
            row: MappingRow {
                id: 0,
                start,
                stop,
                is_forward_strand: true,
                replicate_count: 1,
                num_errors: 1,
                sequence_id: None,
                is_best_mapping: true,
                mapping_count: 1,
            },
            diffs: vec![substitution(start + 1, b'G', true, 1)],
        }
    }

    struct Records(Vec<AlignmentRecord>);

    impl AlignmentSource for Records {
        fn query_overlapping(&self, _chrom: &str, from: i64, to: i64) -> Result<Vec<AlignmentRecord>> {
            Ok(self.0.iter().filter(|r| r.overlaps(from, to)).cloned().collect())
        }

        fn reference_length(&self, _chrom: &str) -> Result<i64> {
            Ok(1_000)
        }
    }

    fn record(start: i64, len: i64) -> AlignmentRecord {
        AlignmentRecord {
            start,
            stop: start + len - 1,
            strand: Strand::Forward,
            cigar: format!("{}M", len),
            read_sequence: Vec::new(),
            classification: None,
            replicate_count: None,
            num_errors: Some(0),
            mapping_count: None,
        }
    }

    fn mappings_of(data: &RequestData) -> &[Mapping] {
        match data {
            RequestData::Mappings { mappings, .. } => mappings,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_diff_requests_are_widened() {
        let mut store = MemoryStore::new();
        // ends 500 bp before the visible interval
        store
            .add_track("t", "chr1", 10_000, vec![new_mapping(4_000, 4_500), new_mapping(7_000, 7_100)])
            .unwrap();
        let mut worker = MappingThread::new(TrackSource::store(Arc::new(store), 1), EngineConfig::default());
        let collector = Arc::new(Collector::default());
        let sender: Arc<dyn ThreadListener> = collector.clone();
        let latest = LatestRequest::default();

        let request = IntervalRequest::with_desired(5_000, 5_100, sender.clone(), DesiredData::MappingsWithDiffs, ReadClassParams::default());
        worker.handle(&request, &latest).unwrap();
        let request = IntervalRequest::with_desired(5_000, 5_100, sender, DesiredData::MappingsWithoutDiffs, ReadClassParams::default());
        worker.handle(&request, &latest).unwrap();

        let data = collector.data.lock().unwrap();
        let with_diffs = mappings_of(&data[0]);
        assert_eq!(with_diffs.len(), 1);
        assert_eq!(with_diffs[0].diffs.len(), 1);
        assert_eq!(data[0].bounds(), (5_000, 5_100));
        assert!(mappings_of(&data[1]).is_empty());
    }

    #[test]
    fn test_reduced_mappings_and_staleness() {
        let mut store = MemoryStore::new();
        store
            .add_track("t", "chr1", 10_000, vec![new_mapping(100, 200)])
            .unwrap();
        let mut worker = MappingThread::new(TrackSource::store(Arc::new(store), 1), EngineConfig::default());
        let collector = Arc::new(Collector::default());
        let sender: Arc<dyn ThreadListener> = collector.clone();
        let latest = LatestRequest::default();

        let request = IntervalRequest::with_desired(150, 160, sender.clone(), DesiredData::ReducedMappings, ReadClassParams::default());
        latest.publish(Arc::new(request.clone()));
        worker.handle(&request, &latest).unwrap();

        latest.publish(Arc::new(IntervalRequest::new(5_000, 5_010, sender, ReadClassParams::default())));
        worker.handle(&request, &latest).unwrap();

        let data = collector.data.lock().unwrap();
        assert_eq!(data.len(), 1);
        match &data[0] {
            RequestData::ReducedMappings { mappings, .. } => {
                assert_eq!(mappings.len(), 1);
                assert_eq!((mappings[0].start, mappings[0].stop), (100, 200));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_analyses_use_id_ranges_for_store_tracks() {
        let mut store = MemoryStore::new();
        store
            .add_track("t", "chr1", 10_000, (0..5).map(|i| new_mapping(i * 100 + 1, i * 100 + 50)).collect())
            .unwrap();
        let mut worker = MappingThreadAnalyses::new(TrackSource::store(Arc::new(store), 1), EngineConfig::default());
        let collector = Arc::new(Collector::default());
        let sender: Arc<dyn ThreadListener> = collector.clone();
        let latest = LatestRequest::default();
        // staleness is ignored
        latest.publish(Arc::new(IntervalRequest::new(9_000, 9_100, sender.clone(), ReadClassParams::default())));

        worker.handle(&IntervalRequest::new(2, 4, sender, ReadClassParams::default()), &latest).unwrap();
        let data = collector.data.lock().unwrap();
        let ids: Vec<u64> = mappings_of(&data[0]).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_analyses_keep_mappings_starting_in_window_for_files() {
        let source = TrackSource::file(
            1,
            "chr1",
            Arc::new(Records(vec![record(90, 20), record(105, 10), record(195, 20)])),
            None,
            true,
        );
        let mut worker = MappingThreadAnalyses::new(source, EngineConfig::default());
        let collector = Arc::new(Collector::default());
        let sender: Arc<dyn ThreadListener> = collector.clone();
        let latest = LatestRequest::default();

        worker
            .handle(&IntervalRequest::with_desired(100, 199, sender, DesiredData::MappingsWithoutDiffs, ReadClassParams::default()), &latest)
            .unwrap();
        let data = collector.data.lock().unwrap();
        let starts: Vec<i64> = mappings_of(&data[0]).iter().map(|m| m.start).collect();
        assert_eq!(starts, vec![105, 195]);
    }
}
