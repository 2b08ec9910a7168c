use crate::config::EngineConfig;
use crate::error::Error;
use crate::request::{DesiredData, IntervalRequest, ReadClassParams, RequestData, ThreadListener};
use crate::source::TrackSource;
use crate::threads::{CoverageThread, MappingThread};
use crossbeam_channel::{unbounded, Sender};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chromosome: String,
    pub from: i64,
    pub to: i64,
}

/// Parse `chrom:from-to`, 1-based inclusive.
pub fn parse_region(text: &str) -> io::Result<Region> {
    let re = Regex::new(r"^(.+):(\d+)-(\d+)$")
        .map_err(|e| io::Error::other(e.to_string()))?;
    let invalid = || {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Region '{}' should be `chrom:from-to`", text),
        )
    };
    let caps = re.captures(text.trim()).ok_or_else(invalid)?;
    let from: i64 = caps[2].parse().map_err(|_| invalid())?;
    let to: i64 = caps[3].parse().map_err(|_| invalid())?;
    if from < 1 || from > to {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid region bounds {}-{}", from, to),
        ));
    }
    Ok(Region {
        chromosome: caps[1].to_string(),
        from,
        to,
    })
}

struct ChannelListener(Sender<Result<RequestData, String>>);

impl ThreadListener for ChannelListener {
    fn receive_data(&self, data: RequestData) {
        let _ = self.0.send(Ok(data));
    }

    fn receive_failure(&self, error: &Error) {
        let _ = self.0.send(Err(error.to_string()));
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ViewSummary {
    pub max_coverage: u32,
    pub mean_coverage: f64,
    pub mappings: usize,
    pub diffs: usize,
    pub gaps: usize,
}

impl ViewSummary {
    fn add(&mut self, data: &RequestData, region: &Region) -> crate::error::Result<()> {
        match data {
            RequestData::Coverage { coverage, .. } => {
                // viewport workers deliver their whole cached window
                let visible = coverage.sub_coverage(region.from, region.to)?;
                let counts = visible.counts();
                let mut sum = 0u64;
                for idx in 0..visible.width() {
                    let total = counts.total(idx);
                    self.max_coverage = self.max_coverage.max(total);
                    sum += u64::from(total);
                }
                self.mean_coverage = sum as f64 / visible.width() as f64;
            }
            RequestData::Mappings { mappings, .. } => {
                // diffs requests are widened, count what reaches into the region
                for mapping in mappings.iter().filter(|m| m.overlaps(region.from, region.to)) {
                    self.mappings += 1;
                    self.diffs += mapping.diffs.len();
                    self.gaps += mapping.gaps.len();
                }
            }
            RequestData::ReducedMappings { mappings, .. } => self.mappings += mappings.len(),
        }
        Ok(())
    }
}

/// Ask a viewport coverage worker and a viewport mapping worker for `region`
/// and summarize what they deliver.
pub fn view_region(
    coverage_source: TrackSource,
    mapping_source: TrackSource,
    region: &Region,
    read_classes: ReadClassParams,
    config: EngineConfig,
) -> io::Result<ViewSummary> {
    let coverage_worker = CoverageThread::new(coverage_source, config.clone()).start("view-coverage")?;
    let mapping_worker = MappingThread::new(mapping_source, config).start("view-mappings")?;

    let (sender, receiver) = unbounded();
    let listener: Arc<dyn ThreadListener> = Arc::new(ChannelListener(sender));
    coverage_worker.add_request(IntervalRequest::new(
        region.from,
        region.to,
        Arc::clone(&listener),
        read_classes,
    ));
    mapping_worker.add_request(IntervalRequest::with_desired(
        region.from,
        region.to,
        listener,
        DesiredData::MappingsWithDiffs,
        read_classes,
    ));

    let mut summary = ViewSummary::default();
    for _ in 0..2 {
        let data = receiver
            .recv()
            .map_err(|e| io::Error::other(e.to_string()))?
            .map_err(io::Error::other)?;
        summary.add(&data, region)?;
    }
    coverage_worker.join();
    mapping_worker.join();
    Ok(summary)
}

pub fn write_summary<W: Write>(out: &mut W, region: &Region, summary: &ViewSummary) -> io::Result<()> {
    writeln!(out, "region\t{}:{}-{}", region.chromosome, region.from, region.to)?;
    writeln!(out, "max_coverage\t{}", summary.max_coverage)?;
    writeln!(out, "mean_coverage\t{:.2}", summary.mean_coverage)?;
    writeln!(out, "mappings\t{}", summary.mappings)?;
    writeln!(out, "diffs\t{}", summary.diffs)?;
    writeln!(out, "gaps\t{}", summary.gaps)
}
