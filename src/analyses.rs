//! Whole-track analysis sweeps.
//!
//! A sweep splits a track into fixed-size requests, queues all of them on one
//! analysis worker and forwards every result to the registered observers. When
//! the last result arrives the parent is told to show the analysis.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::mapping::TrackId;
use crate::progress::{NoProgress, ProgressReporter};
use crate::request::{DesiredData, IntervalRequest, ReadClassParams, RequestData, ThreadListener};
use crate::source::TrackSource;
use crate::store::TrackStore;
use crate::threads::{CoverageThread, MappingThreadAnalyses, RequestThread};
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    Coverage,
    Mappings { with_diffs: bool },
}

impl AnalysisKind {
    fn desired(self) -> DesiredData {
        match self {
            AnalysisKind::Coverage => DesiredData::Normal,
            AnalysisKind::Mappings { with_diffs: true } => DesiredData::MappingsWithDiffs,
            AnalysisKind::Mappings { with_diffs: false } => DesiredData::MappingsWithoutDiffs,
        }
    }
}

/// Consumer of the results of a sweep, called on the worker thread.
pub trait AnalysisObserver: Send + Sync {
    fn update(&self, data: &RequestData);

    fn analysis_failed(&self, _error: &Error) {}
}

/// Owner of an analysis, notified once all requests of a sweep are done.
pub trait DataVisualisation: Send + Sync {
    fn show_data(&self, data: (TrackId, String));
}

/// Request bookkeeping of the running sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RequestCounters {
    pub nb_cov_requests: usize,
    pub nb_mapping_requests: usize,
    pub nb_requests: usize,
    pub nb_carried_out_requests: usize,
}

#[derive(Debug, Default)]
struct SweepState {
    counters: RequestCounters,
    running: bool,
    /// Number of the latest sweep, carried by its requests' listener
    sweep: u64,
}

impl SweepState {
    fn end(&mut self) {
        self.counters = RequestCounters::default();
        self.running = false;
    }
}

/// Split `[first, last]` into consecutive windows of `step`, the last one
/// ending at `last`.
pub fn tile(first: i64, last: i64, step: i64) -> Vec<(i64, i64)> {
    let mut chunks = Vec::new();
    if step <= 0 || last < first {
        return chunks;
    }
    let mut from = first;
    while from <= last {
        let to = from.saturating_add(step - 1).min(last);
        chunks.push((from, to));
        from = to + 1;
    }
    chunks
}

/// Position windows of a coverage sweep over `[1, reference_length]`.
pub fn coverage_chunks(reference_length: i64, chunk_size: i64) -> Vec<(i64, i64)> {
    tile(1, reference_length, chunk_size)
}

/// Position windows of a mapping sweep over a file-backed track.
pub fn file_mapping_chunks(reference_length: i64, chunk_size: i64) -> Vec<(i64, i64)> {
    tile(0, reference_length, chunk_size)
}

/// Id windows of a mapping sweep over `count` mappings whose ids follow `offset`.
pub fn id_chunks(offset: u64, count: u64, chunk_size: i64) -> Vec<(i64, i64)> {
    if count == 0 {
        return Vec::new();
    }
    tile(offset as i64 + 1, (offset + count) as i64, chunk_size)
}

/// Number of mapping ids taken by all tracks stored before `track_id`.
pub fn mapping_id_offset(store: &dyn TrackStore, track_id: TrackId) -> Result<u64> {
    let mut offset = 0;
    for track in store.tracks()? {
        if track.id < track_id {
            offset += store.count_unique_mappings(track.id)?;
        }
    }
    Ok(offset)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs analysis sweeps over one track.
pub struct AnalysesHandler {
    kind: AnalysisKind,
    track_id: TrackId,
    label: String,
    read_classes: ReadClassParams,
    config: EngineConfig,
    reference_length: i64,
    /// Set for store-backed tracks, whose mapping sweeps go by id
    store: Option<Arc<dyn TrackStore>>,
    parent: Arc<dyn DataVisualisation>,
    observers: RwLock<Vec<Arc<dyn AnalysisObserver>>>,
    progress: Mutex<Box<dyn ProgressReporter>>,
    state: Mutex<SweepState>,
    worker: RequestThread,
}

/// Listener handed to the worker for the requests of one sweep. It holds the
/// handler weakly, the handler owns the worker.
struct HandlerRef {
    handler: Weak<AnalysesHandler>,
    sweep: u64,
}

impl ThreadListener for HandlerRef {
    fn receive_data(&self, data: RequestData) {
        if let Some(handler) = self.handler.upgrade() {
            handler.sweep_data(self.sweep, data);
        }
    }

    fn receive_failure(&self, error: &Error) {
        if let Some(handler) = self.handler.upgrade() {
            handler.sweep_failed(self.sweep, error);
        }
    }
}

impl AnalysesHandler {
    pub fn new(
        kind: AnalysisKind,
        source: TrackSource,
        label: &str,
        read_classes: ReadClassParams,
        parent: Arc<dyn DataVisualisation>,
        config: EngineConfig,
    ) -> Result<Arc<Self>> {
        let track_id = source.track_id();
        let reference_length = source.reference_length()?;
        let store = match &source {
            TrackSource::Store { store, .. } => Some(Arc::clone(store)),
            TrackSource::File(_) => None,
        };
        let name = format!("analysis-{}-{}", track_id, label);
        let worker = match kind {
            AnalysisKind::Coverage => CoverageThread::analysis(source, config.clone()).start(&name)?,
            AnalysisKind::Mappings { .. } => {
                MappingThreadAnalyses::new(source, config.clone()).start(&name)?
            }
        };

        Ok(Arc::new(Self {
            kind,
            track_id,
            label: label.to_string(),
            read_classes,
            config,
            reference_length,
            store,
            parent,
            observers: RwLock::new(Vec::new()),
            progress: Mutex::new(Box::new(NoProgress)),
            state: Mutex::new(SweepState::default()),
            worker,
        }))
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    pub fn set_progress(&self, progress: Box<dyn ProgressReporter>) {
        *lock(&self.progress) = progress;
    }

    pub fn register_observer(&self, observer: Arc<dyn AnalysisObserver>) {
        match self.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    pub fn counters(&self) -> RequestCounters {
        lock(&self.state).counters
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    /// Request windows of the next sweep. Mapping id offsets are recomputed on
    /// every call since tracks may have been added since the last sweep.
    pub fn plan(&self) -> Result<Vec<(i64, i64)>> {
        match (self.kind, &self.store) {
            (AnalysisKind::Coverage, _) => Ok(coverage_chunks(
                self.reference_length,
                self.config.coverage_chunk_size,
            )),
            (AnalysisKind::Mappings { .. }, Some(store)) => {
                let offset = mapping_id_offset(store.as_ref(), self.track_id)?;
                let count = store.count_unique_mappings(self.track_id)?;
                Ok(id_chunks(offset, count, self.config.mapping_chunk_size))
            }
            (AnalysisKind::Mappings { .. }, None) => Ok(file_mapping_chunks(
                self.reference_length,
                self.config.mapping_chunk_size,
            )),
        }
    }

    /// Queue all requests of a sweep. A sweep without requests completes
    /// immediately.
    pub fn start_analysis(self: &Arc<Self>) -> Result<()> {
        if self.worker.is_interrupted() {
            return Err(Error::Analysis(format!(
                "worker of track {} has stopped after a failure",
                self.track_id
            )));
        }
        let chunks = self.plan()?;
        let total = chunks.len();
        let sweep = {
            let mut state = lock(&self.state);
            if state.running {
                return Err(Error::Analysis(format!(
                    "{} analysis of track {} is already running",
                    self.label, self.track_id
                )));
            }
            state.sweep += 1;
            state.counters = RequestCounters::default();
            match self.kind {
                AnalysisKind::Coverage => state.counters.nb_cov_requests = total,
                AnalysisKind::Mappings { .. } => state.counters.nb_mapping_requests = total,
            }
            state.counters.nb_requests = total;
            state.running = total > 0;
            state.sweep
        };

        info!(
            "Starting {} analysis of track {} with {} requests",
            self.label, self.track_id, total
        );
        {
            let mut progress = lock(&self.progress);
            progress.start(total);
            progress.switch_to_determinate(total);
        }
        if total == 0 {
            self.finish();
            return Ok(());
        }

        let listener: Arc<dyn ThreadListener> = Arc::new(HandlerRef {
            handler: Arc::downgrade(self),
            sweep,
        });
        let desired = self.kind.desired();
        for (from, to) in chunks {
            self.worker.add_request(IntervalRequest::with_desired(
                from,
                to,
                Arc::clone(&listener),
                desired,
                self.read_classes,
            ));
        }
        Ok(())
    }

    fn finish(&self) {
        lock(&self.progress).finish();
        self.parent.show_data((self.track_id, self.label.clone()));
    }

    fn observers(&self) -> Vec<Arc<dyn AnalysisObserver>> {
        match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AnalysesHandler {
    fn sweep_data(&self, sweep: u64, data: RequestData) {
        let (carried_out, total, done) = {
            let mut state = lock(&self.state);
            // results of a sweep that failed or was superseded
            if !state.running || state.sweep != sweep {
                return;
            }
            state.counters.nb_carried_out_requests += 1;
            let carried_out = state.counters.nb_carried_out_requests;
            let total = state.counters.nb_requests;
            let done = carried_out >= total;
            if done {
                state.end();
            }
            (carried_out, total, done)
        };

        lock(&self.progress).progress(&format!("request {} of {}", carried_out, total), carried_out);
        for observer in self.observers() {
            observer.update(&data);
        }
        if done {
            info!("{} analysis of track {} finished", self.label, self.track_id);
            self.finish();
        }
    }

    /// Ends the sweep. The worker only stops on terminal failures, so the next
    /// `start_analysis` can retry.
    fn sweep_failed(&self, sweep: u64, e: &Error) {
        {
            let mut state = lock(&self.state);
            if !state.running || state.sweep != sweep {
                return;
            }
            state.end();
        }
        error!(
            "{} analysis of track {} failed: {}",
            self.label, self.track_id, e
        );
        if e.is_terminal() {
            self.worker.interrupt();
        }
        for observer in self.observers() {
            observer.analysis_failed(e);
        }
        lock(&self.progress).finish();
    }

    fn current_sweep(&self) -> u64 {
        lock(&self.state).sweep
    }
}

/// Results handed in directly count towards the current sweep.
impl ThreadListener for AnalysesHandler {
    fn receive_data(&self, data: RequestData) {
        self.sweep_data(self.current_sweep(), data);
    }

    fn receive_failure(&self, e: &Error) {
        self.sweep_failed(self.current_sweep(), e);
    }
}
