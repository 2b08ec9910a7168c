use clap::Parser;
use rayon::ThreadPoolBuilder;
use rxplore::alignment_record::AlignmentFormat;
use rxplore::bam::{AlignmentSource, BamFile};
use rxplore::commands::{coverage, mappings, tracks, view};
use rxplore::config::EngineConfig;
use rxplore::faidx::{FastaReference, ReferenceSource};
use rxplore::mapping::TrackId;
use rxplore::request::ReadClassParams;
use rxplore::source::TrackSource;
use rxplore::store::{MemoryStore, TrackInfo, TrackStore};
use std::io::{self, BufWriter};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing (defaults to the number of CPUs).
    #[clap(short = 't', long, value_parser)]
    num_threads: Option<NonZeroUsize>,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Which track to read: a track of a store snapshot, or a chromosome of an indexed BAM file.
#[derive(Parser, Debug)]
struct TrackOpts {
    /// Store snapshot
    #[clap(short = 's', long, value_parser, conflicts_with = "bam")]
    store: Option<String>,

    /// Track id within the store
    #[clap(long, value_parser, requires = "store")]
    track: Option<TrackId>,

    /// Indexed BAM/CRAM/SAM file
    #[clap(short = 'b', long, value_parser)]
    bam: Option<String>,

    /// Chromosome of the BAM file
    #[clap(short = 'c', long, value_parser, requires = "bam")]
    chrom: Option<String>,

    /// Indexed FASTA reference, needed to call mismatches of `M` operations
    #[clap(short = 'r', long, value_parser)]
    reference: Option<String>,

    /// Ignore soft-clipped bases instead of counting them as mismatches.
    #[clap(long, action)]
    ignore_soft_clips: bool,
}

/// Read-class filter. Classes combine with OR.
#[derive(Parser, Debug)]
struct ReadClassOpts {
    /// Exclude perfect matches
    #[clap(long, action)]
    no_perfect: bool,

    /// Exclude best matches
    #[clap(long, action)]
    no_best: bool,

    /// Exclude common matches
    #[clap(long, action)]
    no_common: bool,

    /// Only reads mapping to a single position
    #[clap(long, action)]
    unique: bool,
}

impl ReadClassOpts {
    fn params(&self) -> ReadClassParams {
        ReadClassParams::new(!self.no_perfect, !self.no_best, !self.no_common, self.unique)
    }
}

/// Interval queries, coverage and alignment sweeps over read tracks.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Sweep the coverage of a track and write bedGraph
    Coverage {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        track: TrackOpts,

        #[clap(flatten)]
        read_classes: ReadClassOpts,

        /// Positions per request
        #[clap(long, value_parser, default_value_t = 200_000)]
        chunk_size: i64,
    },
    /// Sweep the mappings of a track and write TSV
    Mappings {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        track: TrackOpts,

        #[clap(flatten)]
        read_classes: ReadClassOpts,

        /// Include diffs and gaps
        #[clap(short = 'd', long, action)]
        diffs: bool,

        /// Mapping ids (store tracks) or positions (BAM tracks) per request
        #[clap(long, value_parser, default_value_t = 50_000)]
        chunk_size: i64,
    },
    /// Request one region through the viewport workers and summarize it
    View {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(flatten)]
        track: TrackOpts,

        #[clap(flatten)]
        read_classes: ReadClassOpts,

        /// Region as `chrom:from-to`
        #[clap(long, value_parser)]
        region: String,
    },
    /// List the tracks of a store snapshot
    Tracks {
        #[clap(flatten)]
        common: CommonOpts,

        #[clap(short = 's', long, value_parser)]
        store: String,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Coverage {
            common,
            track,
            read_classes,
            chunk_size,
        } => {
            initialize(&common)?;
            let opened = OpenedTrack::open(&track)?;
            let config = EngineConfig {
                coverage_chunk_size: chunk_size,
                ..opened.config()
            };
            let out = BufWriter::new(io::stdout().lock());
            coverage::run_coverage(
                opened.source(),
                &opened.info.chromosome,
                read_classes.params(),
                config,
                out,
            )?;
        }
        Args::Mappings {
            common,
            track,
            read_classes,
            diffs,
            chunk_size,
        } => {
            initialize(&common)?;
            let opened = OpenedTrack::open(&track)?;
            let config = EngineConfig {
                mapping_chunk_size: chunk_size,
                ..opened.config()
            };
            let out = BufWriter::new(io::stdout().lock());
            mappings::run_mappings(opened.source(), diffs, read_classes.params(), config, out)?;
        }
        Args::View {
            common,
            track,
            read_classes,
            region,
        } => {
            initialize(&common)?;
            let region = view::parse_region(&region)?;
            let opened = OpenedTrack::open(&track)?;
            if region.chromosome != opened.info.chromosome {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Track {} is on {}, not {}",
                        opened.info.id, opened.info.chromosome, region.chromosome
                    ),
                ));
            }
            let summary = view::view_region(
                opened.source(),
                opened.source(),
                &region,
                read_classes.params(),
                opened.config(),
            )?;
            view::write_summary(&mut io::stdout().lock(), &region, &summary)?;
        }
        Args::Tracks { common, store } => {
            initialize(&common)?;
            let memory_store = MemoryStore::load(&store)?;
            let summaries = tracks::track_summaries(&memory_store)?;
            tracks::write_summaries(&mut io::stdout().lock(), &summaries)?;
        }
    }

    Ok(())
}

/// Initialize logger and thread pool based on common options
fn initialize(common: &CommonOpts) -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let num_threads = common
        .num_threads
        .map_or_else(num_cpus::get, NonZeroUsize::get);
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| io::Error::other(format!("Failed to build thread pool: {}", e)))
}

/// A track resolved from the command line. Plain BAM input becomes a
/// file-backed track of a throwaway store.
struct OpenedTrack {
    info: TrackInfo,
    store: Arc<dyn TrackStore>,
    reference: Option<Arc<dyn ReferenceSource>>,
    soft_clips_as_mismatches: bool,
}

impl OpenedTrack {
    fn open(opts: &TrackOpts) -> io::Result<Self> {
        let (store, track_id): (Arc<dyn TrackStore>, TrackId) = match (&opts.store, &opts.bam) {
            (Some(path), _) => {
                let track_id = opts.track.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "--track is required with --store")
                })?;
                let store: Arc<dyn TrackStore> = Arc::new(MemoryStore::load(path)?);
                (store, track_id)
            }
            (None, Some(bam)) => {
                let chrom = opts.chrom.as_deref().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "--chrom is required with --bam")
                })?;
                if !AlignmentFormat::from_path(bam).is_some_and(|format| format.is_indexable()) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("'{}' is not an indexed BAM or CRAM file", bam),
                    ));
                }
                let reference_length = BamFile::new(bam.clone()).reference_length(chrom)?;
                let mut store = MemoryStore::new();
                let track_id = store.add_file_track(bam, chrom, reference_length, bam);
                let store: Arc<dyn TrackStore> = Arc::new(store);
                (store, track_id)
            }
            (None, None) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Either --store or --bam must be provided",
                ))
            }
        };
        let info = store.track(track_id)?;
        let reference = opts
            .reference
            .as_ref()
            .map(|path| Arc::new(FastaReference::new(path.clone())) as Arc<dyn ReferenceSource>);
        Ok(Self {
            info,
            store,
            reference,
            soft_clips_as_mismatches: !opts.ignore_soft_clips,
        })
    }

    fn config(&self) -> EngineConfig {
        EngineConfig {
            soft_clips_as_mismatches: self.soft_clips_as_mismatches,
            ..EngineConfig::default()
        }
    }

    fn source(&self) -> TrackSource {
        TrackSource::for_track(
            &self.info,
            Arc::clone(&self.store),
            self.reference.clone(),
            self.soft_clips_as_mismatches,
        )
    }
}
