use crossbeam_channel::{unbounded, Receiver, Sender};
use rxplore::alignment_record::{AlignmentRecord, Strand};
use rxplore::analyses::{AnalysesHandler, AnalysisKind, AnalysisObserver, DataVisualisation};
use rxplore::bam::AlignmentSource;
use rxplore::config::EngineConfig;
use rxplore::mapping::TrackId;
use rxplore::request::{ReadClassParams, RequestData};
use rxplore::source::TrackSource;
use rxplore::store::memory::{substitution, MemoryStore, NewMapping};
use rxplore::store::{MappingRow, TrackStore};
use rxplore::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Collected {
    data: Mutex<Vec<RequestData>>,
    failures: Mutex<Vec<String>>,
}

impl AnalysisObserver for Collected {
    fn update(&self, data: &RequestData) {
        self.data.lock().unwrap().push(data.clone());
    }

    fn analysis_failed(&self, error: &Error) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

struct Parent(Sender<(TrackId, String)>);

impl DataVisualisation for Parent {
    fn show_data(&self, data: (TrackId, String)) {
        self.0.send(data).unwrap();
    }
}

fn parent() -> (Arc<Parent>, Receiver<(TrackId, String)>) {
    let (sender, receiver) = unbounded();
    (Arc::new(Parent(sender)), receiver)
}

fn new_mapping(start: i64, stop: i64, is_forward: bool) -> NewMapping {
    NewMapping {
        row: MappingRow {
            id: 0,
            start,
            stop,
            is_forward_strand: is_forward,
            replicate_count: 1,
            num_errors: 1,
            sequence_id: None,
            is_best_mapping: true,
            mapping_count: 1,
        },
        diffs: vec![substitution(start, b'C', is_forward, 1)],
    }
}

fn run(handler: &Arc<AnalysesHandler>, shown: &Receiver<(TrackId, String)>) -> (TrackId, String) {
    handler.start_analysis().unwrap();
    shown.recv_timeout(Duration::from_secs(30)).expect("analysis did not finish")
}

#[test]
fn test_coverage_sweep_covers_reference_in_chunks() {
    let mut store = MemoryStore::new();
    let track = store
        .add_track(
            "reads",
            "chr1",
            450_000,
            vec![new_mapping(199_990, 200_010, true), new_mapping(449_990, 450_000, false)],
        )
        .unwrap();
    let (parent, shown) = parent();
    let handler = AnalysesHandler::new(
        AnalysisKind::Coverage,
        TrackSource::store(Arc::new(store), track),
        "coverage",
        ReadClassParams::default(),
        parent,
        EngineConfig::default(),
    )
    .unwrap();
    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());

    assert_eq!(run(&handler, &shown), (track, "coverage".to_string()));
    // parent is notified exactly once
    assert!(shown.recv_timeout(Duration::from_millis(100)).is_err());

    let data = observer.data.lock().unwrap();
    let bounds: Vec<(i64, i64)> = data.iter().map(RequestData::bounds).collect();
    assert_eq!(bounds, vec![(1, 200_000), (200_001, 400_000), (400_001, 450_000)]);

    let mut total = 0u64;
    for item in data.iter() {
        if let RequestData::Coverage { coverage, from, to, .. } = item {
            total += (*from..=*to).map(|p| u64::from(coverage.total_at(p).unwrap())).sum::<u64>();
        }
    }
    assert_eq!(total, 21 + 11);
    assert!(!handler.is_running());
}

#[test]
fn test_mapping_sweep_uses_ids_after_earlier_tracks() {
    let mut store = MemoryStore::new();
    store
        .add_track("first", "chr1", 10_000, (0..7).map(|i| new_mapping(i * 100 + 1, i * 100 + 50, true)).collect())
        .unwrap();
    let second = store
        .add_track("second", "chr1", 10_000, (0..5).map(|i| new_mapping(i * 300 + 1, i * 300 + 80, i % 2 == 0)).collect())
        .unwrap();
    let store = Arc::new(store);

    let (parent, shown) = parent();
    let config = EngineConfig {
        mapping_chunk_size: 2,
        ..EngineConfig::default()
    };
    let handler = AnalysesHandler::new(
        AnalysisKind::Mappings { with_diffs: true },
        TrackSource::store(store.clone(), second),
        "mappings",
        ReadClassParams::default(),
        parent,
        config,
    )
    .unwrap();
    assert_eq!(handler.plan().unwrap(), vec![(8, 9), (10, 11), (12, 12)]);

    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());
    run(&handler, &shown);

    let data = observer.data.lock().unwrap();
    let mut ids = Vec::new();
    for item in data.iter() {
        if let RequestData::Mappings { mappings, .. } = item {
            for mapping in mappings {
                assert_eq!(mapping.track_id, second);
                assert_eq!(mapping.diffs.len(), 1);
                ids.push(mapping.id);
            }
        }
    }
    assert_eq!(ids, (8..=12).collect::<Vec<u64>>());
    assert_eq!(store.count_unique_mappings(second).unwrap(), 5);
}

#[test]
fn test_sweep_can_run_again_after_completion() {
    let mut store = MemoryStore::new();
    let track = store.add_track("reads", "chr1", 1_000, vec![new_mapping(10, 20, true)]).unwrap();
    let (parent, shown) = parent();
    let handler = AnalysesHandler::new(
        AnalysisKind::Coverage,
        TrackSource::store(Arc::new(store), track),
        "coverage",
        ReadClassParams::default(),
        parent,
        EngineConfig::default(),
    )
    .unwrap();
    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());

    run(&handler, &shown);
    run(&handler, &shown);
    assert_eq!(observer.data.lock().unwrap().len(), 2);
}

/// Alignment file stand-in holding its records in memory.
struct InMemoryAlignments {
    records: Vec<AlignmentRecord>,
    length: i64,
}

impl AlignmentSource for InMemoryAlignments {
    fn query_overlapping(&self, _chrom: &str, from: i64, to: i64) -> Result<Vec<AlignmentRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.overlaps(from, to))
            .cloned()
            .collect())
    }

    fn reference_length(&self, _chrom: &str) -> Result<i64> {
        Ok(self.length)
    }
}

fn record(start: i64, cigar: &str, len: i64, strand: Strand) -> AlignmentRecord {
    AlignmentRecord {
        start,
        stop: start + len - 1,
        strand,
        cigar: cigar.to_string(),
        read_sequence: Vec::new(),
        classification: None,
        replicate_count: None,
        num_errors: Some(0),
        mapping_count: Some(1),
    }
}

#[test]
fn test_file_backed_sweeps_deliver_every_record_once() {
    let starts = [1, 49_990, 50_000, 50_001, 99_999, 120_000];
    let alignments = Arc::new(InMemoryAlignments {
        records: starts
            .iter()
            .map(|&s| record(s, "30M", 30, Strand::Reverse))
            .collect(),
        length: 120_029,
    });

    let (parent, shown) = parent();
    let handler = AnalysesHandler::new(
        AnalysisKind::Mappings { with_diffs: false },
        TrackSource::file(1, "chr1", alignments.clone(), None, true),
        "mappings",
        ReadClassParams::default(),
        parent.clone(),
        EngineConfig::default(),
    )
    .unwrap();
    assert_eq!(handler.plan().unwrap().len(), 3);
    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());
    run(&handler, &shown);

    let mut delivered: Vec<i64> = Vec::new();
    for item in observer.data.lock().unwrap().iter() {
        if let RequestData::Mappings { mappings, .. } = item {
            delivered.extend(mappings.iter().map(|m| m.start));
        }
    }
    assert_eq!(delivered, starts.to_vec());

    // coverage of the same file
    let handler = AnalysesHandler::new(
        AnalysisKind::Coverage,
        TrackSource::file(1, "chr1", alignments, None, true),
        "coverage",
        ReadClassParams::default(),
        parent,
        EngineConfig::default(),
    )
    .unwrap();
    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());
    run(&handler, &shown);
    let mut total = 0u64;
    for item in observer.data.lock().unwrap().iter() {
        if let RequestData::Coverage { coverage, from, to, .. } = item {
            total += (*from..=*to).map(|p| u64::from(coverage.total_at(p).unwrap())).sum::<u64>();
        }
    }
    assert_eq!(total, 30 * starts.len() as u64);
}

/// Alignment file whose first read fails, as a dropped network mount would.
struct FailsOnce {
    inner: InMemoryAlignments,
    failed: AtomicBool,
}

impl AlignmentSource for FailsOnce {
    fn query_overlapping(&self, chrom: &str, from: i64, to: i64) -> Result<Vec<AlignmentRecord>> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("connection reset")));
        }
        self.inner.query_overlapping(chrom, from, to)
    }

    fn reference_length(&self, chrom: &str) -> Result<i64> {
        self.inner.reference_length(chrom)
    }
}

#[test]
fn test_sweep_can_be_retried_after_io_failure() {
    let alignments = Arc::new(FailsOnce {
        inner: InMemoryAlignments {
            records: vec![record(100, "30M", 30, Strand::Forward)],
            length: 1_000,
        },
        failed: AtomicBool::new(false),
    });
    let (parent, shown) = parent();
    let handler = AnalysesHandler::new(
        AnalysisKind::Coverage,
        TrackSource::file(1, "chr1", alignments, None, true),
        "coverage",
        ReadClassParams::default(),
        parent,
        EngineConfig::default(),
    )
    .unwrap();
    let observer = Arc::new(Collected::default());
    handler.register_observer(observer.clone());

    handler.start_analysis().unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    while observer.failures.lock().unwrap().is_empty() {
        assert!(std::time::Instant::now() < deadline, "failure was not reported");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(!handler.is_running());
    assert!(shown.try_recv().is_err());

    assert_eq!(run(&handler, &shown), (1, "coverage".to_string()));
    assert_eq!(observer.failures.lock().unwrap().len(), 1);
    let data = observer.data.lock().unwrap();
    assert_eq!(data.len(), 1);
    if let RequestData::Coverage { coverage, .. } = &data[0] {
        assert_eq!(coverage.total_at(100).unwrap(), 1);
    } else {
        panic!("unexpected payload {:?}", data[0]);
    }
}
