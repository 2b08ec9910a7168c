pub mod coverage;
pub mod mappings;
pub mod tracks;
pub mod view;

use crate::analyses::{AnalysesHandler, AnalysisKind, AnalysisObserver, DataVisualisation};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::mapping::TrackId;
use crate::progress::LogProgress;
use crate::request::{ReadClassParams, RequestData};
use crate::source::TrackSource;
use crossbeam_channel::{unbounded, Sender};
use std::io;
use std::sync::Arc;

enum SweepEvent {
    Data(RequestData),
    Failed(String),
    Done,
}

/// Forwards sweep results and completion to the thread that started the sweep.
struct ChannelSink(Sender<SweepEvent>);

impl AnalysisObserver for ChannelSink {
    fn update(&self, data: &RequestData) {
        let _ = self.0.send(SweepEvent::Data(data.clone()));
    }

    fn analysis_failed(&self, error: &Error) {
        let _ = self.0.send(SweepEvent::Failed(error.to_string()));
    }
}

impl DataVisualisation for ChannelSink {
    fn show_data(&self, _data: (TrackId, String)) {
        let _ = self.0.send(SweepEvent::Done);
    }
}

/// Run one analysis sweep to completion, handing every result to `on_data` in
/// request order on the calling thread.
pub fn run_sweep(
    kind: AnalysisKind,
    source: TrackSource,
    label: &str,
    read_classes: ReadClassParams,
    config: EngineConfig,
    mut on_data: impl FnMut(RequestData) -> io::Result<()>,
) -> io::Result<()> {
    let (sender, receiver) = unbounded();
    let sink = Arc::new(ChannelSink(sender));
    let handler = AnalysesHandler::new(kind, source, label, read_classes, sink.clone(), config)?;
    handler.register_observer(sink);
    handler.set_progress(Box::new(LogProgress::new(format!(
        "{} of track {}",
        label,
        handler.track_id()
    ))));
    handler.start_analysis()?;

    for event in receiver.iter() {
        match event {
            SweepEvent::Data(data) => on_data(data)?,
            SweepEvent::Failed(message) => return Err(io::Error::other(message)),
            SweepEvent::Done => break,
        }
    }
    Ok(())
}
