use std::time::Duration;

/// Tunables of the request workers and the analysis sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Half width of the window a viewport coverage worker fetches around the
    /// center of a request, so small scrolls are served from the cache
    pub coverage_half_width: i64,
    /// Widening applied on both sides of mapping requests with diffs
    pub fixed_interval_length: i64,
    /// Positions per coverage analysis request
    pub coverage_chunk_size: i64,
    /// Positions (file-backed) or mapping ids (store-backed) per mapping analysis request
    pub mapping_chunk_size: i64,
    /// How long an idle worker waits for a request before re-checking its interrupt flag
    pub poll_interval: Duration,
    pub soft_clips_as_mismatches: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coverage_half_width: 25_000,
            fixed_interval_length: 1_000,
            coverage_chunk_size: 200_000,
            mapping_chunk_size: 50_000,
            poll_interval: Duration::from_millis(10),
            soft_clips_as_mismatches: true,
        }
    }
}
