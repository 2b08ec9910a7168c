// src/threads/coverage_thread.rs
use super::request_thread::{LatestRequest, RequestHandler, RequestThread};
use crate::config::EngineConfig;
use crate::coverage::Coverage;
use crate::error::Result;
use crate::request::{DesiredData, IntervalRequest, ReadClassParams, RequestData};
use crate::source::TrackSource;
use log::debug;
use std::sync::Arc;

enum CoverageTracks {
    Single(TrackSource),
    /// Coverage is the per-position absolute difference of the two tracks
    Double(TrackSource, TrackSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoverageMode {
    /// Expanded windows around the request center, cached between requests,
    /// stale requests skipped
    Viewport,
    /// Exactly the requested interval, every request executed
    Analysis,
}

/// What a cached coverage was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    read_starts: bool,
    read_classes: ReadClassParams,
}

impl CacheKey {
    fn of(request: &IntervalRequest) -> Self {
        Self {
            read_starts: request.desired() == DesiredData::ReadStarts,
            read_classes: *request.read_classes(),
        }
    }
}

/// Coverage worker for one or two tracks.
pub struct CoverageThread {
    tracks: CoverageTracks,
    mode: CoverageMode,
    config: EngineConfig,
    cached: Option<(CacheKey, Arc<Coverage>)>,
}

impl CoverageThread {
    pub fn new(source: TrackSource, config: EngineConfig) -> Self {
        Self::with_tracks(CoverageTracks::Single(source), CoverageMode::Viewport, config)
    }

    /// Worker comparing two tracks.
    pub fn double(track1: TrackSource, track2: TrackSource, config: EngineConfig) -> Self {
        Self::with_tracks(
            CoverageTracks::Double(track1, track2),
            CoverageMode::Viewport,
            config,
        )
    }

    /// Worker for analysis sweeps: no caching, no staleness check.
    pub fn analysis(source: TrackSource, config: EngineConfig) -> Self {
        Self::with_tracks(CoverageTracks::Single(source), CoverageMode::Analysis, config)
    }

    fn with_tracks(tracks: CoverageTracks, mode: CoverageMode, config: EngineConfig) -> Self {
        Self {
            tracks,
            mode,
            config,
            cached: None,
        }
    }

    pub fn start(self, name: &str) -> Result<RequestThread> {
        let poll_interval = self.config.poll_interval;
        RequestThread::spawn(name, self, poll_interval)
    }

    fn fetch(&mut self, from: i64, to: i64, request: &IntervalRequest) -> Result<Coverage> {
        let read_starts = request.desired() == DesiredData::ReadStarts;
        let read_classes = request.read_classes();
        match &mut self.tracks {
            CoverageTracks::Single(source) => fetch_from(source, from, to, read_classes, read_starts),
            CoverageTracks::Double(track1, track2) => {
                let first = fetch_from(track1, from, to, read_classes, read_starts)?;
                let second = fetch_from(track2, from, to, read_classes, read_starts)?;
                Coverage::two_track(first, second)
            }
        }
    }

    /// Window fetched for a viewport request missing the cache: the configured
    /// half width around the request center, widened for requests larger than it.
    fn window(&self, request: &IntervalRequest) -> (i64, i64) {
        let center = request.center();
        let half_width = self
            .config
            .coverage_half_width
            .max(center - request.total_from())
            .max(request.total_to() - center);
        ((center - half_width).max(1), center + half_width)
    }

    fn handle_viewport(&mut self, request: &IntervalRequest, latest: &LatestRequest) -> Result<()> {
        let key = CacheKey::of(request);
        let (from, to) = (request.total_from(), request.total_to());
        let cache_hit = self
            .cached
            .as_ref()
            .is_some_and(|(cached_key, cov)| *cached_key == key && cov.covers_bounds(from, to));

        if !cache_hit {
            if !latest.matches(request) {
                debug!("Skipping stale coverage request {}-{}", from, to);
                return Ok(());
            }
            let (window_from, window_to) = self.window(request);
            let coverage = self.fetch(window_from, window_to, request)?;
            self.cached = Some((key, Arc::new(coverage)));
        }

        if let Some((_, coverage)) = &self.cached {
            if coverage.covers_bounds(from, to) {
                deliver(request, coverage);
            }
        }
        Ok(())
    }
}

impl RequestHandler for CoverageThread {
    fn handle(&mut self, request: &IntervalRequest, latest: &LatestRequest) -> Result<()> {
        match self.mode {
            CoverageMode::Viewport => self.handle_viewport(request, latest),
            CoverageMode::Analysis => {
                let coverage = self.fetch(request.total_from(), request.total_to(), request)?;
                deliver(request, &Arc::new(coverage));
                Ok(())
            }
        }
    }
}

fn fetch_from(
    source: &mut TrackSource,
    from: i64,
    to: i64,
    read_classes: &ReadClassParams,
    read_starts: bool,
) -> Result<Coverage> {
    if read_starts {
        source.read_starts(from, to, read_classes)
    } else {
        source.coverage(from, to, read_classes)
    }
}

fn deliver(request: &IntervalRequest, coverage: &Arc<Coverage>) {
    let desired = request.desired();
    let coverage = match desired {
        DesiredData::Track1 | DesiredData::Track2 if coverage.is_two_track() => {
            Arc::new(coverage.select(desired))
        }
        _ => Arc::clone(coverage),
    };
    request.sender().receive_data(RequestData::Coverage {
        coverage,
        from: request.total_from(),
        to: request.total_to(),
        desired,
    });
}
