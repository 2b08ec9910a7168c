use crate::analyses::AnalysisKind;
use crate::config::EngineConfig;
use crate::coverage::Coverage;
use crate::request::{ReadClassParams, RequestData};
use crate::source::TrackSource;
use log::info;
use std::io::{self, Write};

/// Writes runs of equal total coverage as bedGraph lines, zero runs omitted.
pub struct BedGraphWriter<W: Write> {
    out: W,
    chromosome: String,
    /// 1-based inclusive start and end of the open run, and its value
    run: Option<(i64, i64, u32)>,
    lines: usize,
}

impl<W: Write> BedGraphWriter<W> {
    pub fn new(out: W, chromosome: &str) -> Self {
        Self {
            out,
            chromosome: chromosome.to_string(),
            run: None,
            lines: 0,
        }
    }

    /// Positions must arrive in increasing order.
    pub fn push(&mut self, position: i64, value: u32) -> io::Result<()> {
        match &mut self.run {
            Some((_, end, run_value)) if *end + 1 == position && *run_value == value => {
                *end = position;
            }
            _ => {
                self.flush_run()?;
                self.run = Some((position, position, value));
            }
        }
        Ok(())
    }

    pub fn push_coverage(&mut self, coverage: &Coverage) -> io::Result<()> {
        for position in coverage.left_bound()..=coverage.right_bound() {
            if let Some(total) = coverage.total_at(position) {
                self.push(position, total)?;
            }
        }
        Ok(())
    }

    fn flush_run(&mut self) -> io::Result<()> {
        if let Some((start, end, value)) = self.run.take() {
            if value > 0 {
                writeln!(self.out, "{}\t{}\t{}\t{}", self.chromosome, start - 1, end, value)?;
                self.lines += 1;
            }
        }
        Ok(())
    }

    /// Write the open run and return the number of lines written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.flush_run()?;
        self.out.flush()?;
        Ok(self.lines)
    }
}

/// Sweep the coverage of a whole track and write it as bedGraph.
pub fn run_coverage<W: Write>(
    source: TrackSource,
    chromosome: &str,
    read_classes: ReadClassParams,
    config: EngineConfig,
    out: W,
) -> io::Result<()> {
    let mut writer = BedGraphWriter::new(out, chromosome);
    super::run_sweep(
        AnalysisKind::Coverage,
        source,
        "coverage",
        read_classes,
        config,
        |data| match data {
            RequestData::Coverage { coverage, .. } => writer.push_coverage(&coverage),
            _ => Ok(()),
        },
    )?;
    let lines = writer.finish()?;
    info!("Wrote {} bedGraph lines for {}", lines, chromosome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingClass;

    #[test]
    fn test_runs_are_merged_across_chunks() {
        let mut first = Coverage::new(1, 5).unwrap();
        first.add_range(3, 5, MappingClass::Perfect, true, 2);
        let mut second = Coverage::new(6, 10).unwrap();
        second.add_range(6, 7, MappingClass::Common, false, 2);
        second.add(9, MappingClass::BestMatch, true, 1);

        let mut out = Vec::new();
        let mut writer = BedGraphWriter::new(&mut out, "chr1");
        writer.push_coverage(&first).unwrap();
        writer.push_coverage(&second).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
        assert_eq!(String::from_utf8(out).unwrap(), "chr1\t2\t7\t2\nchr1\t8\t9\t1\n");
    }
}
