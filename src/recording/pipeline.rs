use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

use super::{EncoderSink, RecordingError};

/// Outcome of a recording pipeline run
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Bytes accepted by the encoder
    pub bytes_written: u64,
    /// Chunks accepted by the encoder
    pub chunks_written: usize,
    /// First failure seen on the sink, if any
    pub error: Option<RecordingError>,
}

impl PipelineReport {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A running capture → encoder forwarder
///
/// The pipeline owns the encoder sink. Stopping it drains whatever the
/// capture already produced, closes the encoder input, and waits for the
/// encoder to finish writing.
pub struct RecordingPipeline {
    output: PathBuf,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<PipelineReport>,
}

impl RecordingPipeline {
    /// Start forwarding `stream` into `sink`
    pub fn start(
        output: PathBuf,
        mut stream: mpsc::Receiver<Vec<u8>>,
        mut sink: Box<dyn EncoderSink>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        info!("Recording pipeline started: {}", output.display());

        let task = tokio::spawn(
            async move {
                let mut report = PipelineReport::default();

                loop {
                    tokio::select! {
                        biased;
                        _ = &mut stop_rx => {
                            // Drain chunks the capture already handed over
                            while let Ok(chunk) = stream.try_recv() {
                                forward(sink.as_mut(), &chunk, &mut report).await;
                            }
                            break;
                        }
                        chunk = stream.recv() => match chunk {
                            Some(chunk) => forward(sink.as_mut(), &chunk, &mut report).await,
                            None => {
                                info!("Media stream ended");
                                break;
                            }
                        },
                    }
                }

                if let Err(e) = sink.finish().await {
                    error!("Encoder failed to finish: {}", e);
                    report.error.get_or_insert(e);
                }

                info!(
                    "Recording pipeline finished ({} chunks, {} bytes)",
                    report.chunks_written, report.bytes_written
                );

                report
            }
            .in_current_span(),
        );

        Self {
            output,
            stop_tx: Some(stop_tx),
            task,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Stop forwarding and wait for the encoder to flush the output file
    pub async fn stop(mut self) -> PipelineReport {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The forwarder may already be done if the stream ended first
            let _ = stop_tx.send(());
        }

        match self.task.await {
            Ok(report) => report,
            Err(e) => PipelineReport {
                error: Some(RecordingError::Forwarder(e.to_string())),
                ..Default::default()
            },
        }
    }
}

async fn forward(sink: &mut dyn EncoderSink, chunk: &[u8], report: &mut PipelineReport) {
    // After the first failure the remaining bytes are discarded
    if report.error.is_some() {
        return;
    }

    match sink.write(chunk).await {
        Ok(()) => {
            report.bytes_written += chunk.len() as u64;
            report.chunks_written += 1;
        }
        Err(e) => {
            warn!("Recording sink failed, discarding further media: {}", e);
            report.error = Some(e);
        }
    }
}
