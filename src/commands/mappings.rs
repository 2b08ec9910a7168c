use crate::analyses::AnalysisKind;
use crate::config::EngineConfig;
use crate::mapping::Mapping;
use crate::request::{ReadClassParams, RequestData};
use crate::source::TrackSource;
use log::info;
use std::io::{self, Write};

pub const TSV_HEADER: &str =
    "#id\tstart\tstop\tstrand\treplicates\terrors\tbest\tmapping_count\tdiffs\tgaps";

/// Diffs as `position:base`, gaps as `position.order:base`, comma separated.
fn format_differences(mapping: &Mapping) -> (String, String) {
    let diffs: Vec<String> = mapping
        .diffs
        .iter()
        .map(|d| format!("{}:{}", d.position, d.base as char))
        .collect();
    let gaps: Vec<String> = mapping
        .gaps
        .iter()
        .map(|g| format!("{}.{}:{}", g.position, g.gap_order, g.base as char))
        .collect();
    let or_dot = |items: Vec<String>| {
        if items.is_empty() {
            ".".to_string()
        } else {
            items.join(",")
        }
    };
    (or_dot(diffs), or_dot(gaps))
}

pub fn write_mapping<W: Write>(out: &mut W, mapping: &Mapping) -> io::Result<()> {
    let (diffs, gaps) = format_differences(mapping);
    writeln!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        mapping.id,
        mapping.start,
        mapping.stop,
        if mapping.is_forward_strand { '+' } else { '-' },
        mapping.replicate_count,
        mapping.num_errors,
        u8::from(mapping.is_best_mapping),
        mapping.mapping_count,
        diffs,
        gaps
    )
}

/// Sweep all mappings of a track and write one TSV row per mapping.
pub fn run_mappings<W: Write>(
    source: TrackSource,
    with_diffs: bool,
    read_classes: ReadClassParams,
    config: EngineConfig,
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "{}", TSV_HEADER)?;
    let mut written = 0usize;
    super::run_sweep(
        AnalysisKind::Mappings { with_diffs },
        source,
        "mappings",
        read_classes,
        config,
        |data| {
            if let RequestData::Mappings { mappings, .. } = data {
                for mapping in &mappings {
                    write_mapping(&mut out, mapping)?;
                }
                written += mappings.len();
            }
            Ok(())
        },
    )?;
    out.flush()?;
    info!("Wrote {} mappings", written);
    Ok(())
}
