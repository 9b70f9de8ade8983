//! Capture → normalize → sinks orchestration.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::export::{ExportError, ExportSink};
use crate::normalize::normalize;
use crate::PacketRecord;
use crate::source::{BurstSource, PacketSource, PcapFileSource, RawFrame, SourceError};
use crate::stream::StreamSink;

/// Lifecycle of a [`Pipeline`]. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("pipeline already started")]
    AlreadyStarted,
}

/// Counters of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Frames pulled from the source.
    pub frames: u64,
    /// Records handed to the sinks.
    pub records: u64,
    /// Frames skipped because they could not be normalized.
    pub frame_errors: u64,
    /// File written by the export sink, if one is configured.
    pub export_path: Option<PathBuf>,
}

/// Wires one capture source to the configured sinks and runs it once.
///
/// Per-frame failures are logged and counted. A source failure moves the
/// pipeline to [`PipelineState::Failed`] without flushing; a normal end or
/// cancellation moves it to [`PipelineState::Stopped`] and flushes the export
/// sink exactly once.
#[derive(Default)]
pub struct Pipeline {
    state: PipelineState,
    export: Option<ExportSink>,
    stream: Option<StreamSink>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_export(mut self, sink: ExportSink) -> Self {
        self.export = Some(sink);
        self
    }

    pub fn with_stream(mut self, sink: StreamSink) -> Self {
        self.stream = Some(sink);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn export(&self) -> Option<&ExportSink> {
        self.export.as_ref()
    }

    /// Replay a capture file through the sinks.
    ///
    /// # Errors
    /// `Source` when the file is missing or unreadable, `Export` when the
    /// final flush fails, `AlreadyStarted` when the pipeline already ran.
    pub fn run_offline(&mut self, path: &Path) -> Result<RunSummary, PipelineError> {
        info!(path = %path.display(), "offline run started");
        self.run_frames(|| PcapFileSource::open(path))
    }

    /// Drain a frame source opened by `open` until it is exhausted.
    pub fn run_frames<S, F>(&mut self, open: F) -> Result<RunSummary, PipelineError>
    where
        S: PacketSource,
        F: FnOnce() -> Result<S, SourceError>,
    {
        self.start()?;
        let mut source = match open() {
            Ok(source) => source,
            Err(err) => return Err(self.fail(err)),
        };

        let mut summary = RunSummary::default();
        loop {
            match source.next_frame() {
                Ok(Some(frame)) => self.dispatch(&frame, &mut summary),
                Ok(None) => break,
                Err(err) => return Err(self.fail(err)),
            }
        }
        self.stop(summary)
    }

    /// Sample bursts from a live source until `shutdown` is cancelled.
    ///
    /// Each burst is sampled on the blocking pool, so the capture never stalls
    /// the runtime. Cancellation is observed between bursts and during the
    /// pause; a burst in flight is finished and delivered first.
    pub async fn run_live<S, F>(
        &mut self,
        open: F,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, PipelineError>
    where
        S: BurstSource + Send + 'static,
        F: FnOnce() -> Result<S, SourceError>,
    {
        self.start()?;
        let mut source = match open() {
            Ok(source) => source,
            Err(err) => return Err(self.fail(err)),
        };
        let interval = source.interval();
        info!(interval_ms = interval.as_millis() as u64, "live run started");

        let mut summary = RunSummary::default();
        while !shutdown.is_cancelled() {
            let sampled = tokio::task::spawn_blocking(move || {
                let burst = source.next_burst();
                (source, burst)
            })
            .await;

            let burst = match sampled {
                Ok((returned, Ok(burst))) => {
                    source = returned;
                    burst
                }
                Ok((_, Err(err))) => return Err(self.fail(err)),
                Err(err) => {
                    let err = SourceError::Capture(format!("capture task failed: {err}"));
                    return Err(self.fail(err));
                }
            };

            debug!(frames = burst.len(), "burst sampled");
            for frame in burst {
                self.dispatch(&frame, &mut summary);
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        self.stop(summary)
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::AlreadyStarted);
        }
        self.state = PipelineState::Running;
        Ok(())
    }

    fn dispatch(&mut self, frame: &RawFrame, summary: &mut RunSummary) {
        summary.frames += 1;
        match normalize(frame) {
            Ok(record) => {
                self.deliver(record);
                summary.records += 1;
            }
            Err(err) => {
                summary.frame_errors += 1;
                warn!(frame = summary.frames, ts = frame.ts, error = %err, "frame skipped");
            }
        }
    }

    fn deliver(&mut self, record: PacketRecord) {
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.publish(&record) {
                warn!(error = %err, "record not streamed");
            }
        }
        if let Some(export) = &mut self.export {
            if let Err(err) = export.push(record) {
                warn!(error = %err, "record not exported");
            }
        }
    }

    fn stop(&mut self, mut summary: RunSummary) -> Result<RunSummary, PipelineError> {
        self.state = PipelineState::Stopped;
        if let Some(export) = &mut self.export {
            summary.export_path = Some(export.flush()?);
        }
        info!(
            frames = summary.frames,
            records = summary.records,
            frame_errors = summary.frame_errors,
            "pipeline stopped"
        );
        Ok(summary)
    }

    fn fail(&mut self, err: SourceError) -> PipelineError {
        self.state = PipelineState::Failed;
        error!(error = %err, "pipeline failed");
        PipelineError::Source(err)
    }
}
