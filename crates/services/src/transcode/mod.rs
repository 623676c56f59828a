//! Audio transcoder
//!
//! Decodes the browser's container/codec audio (WebM/Opus or similar) to
//! raw PCM by piping chunks through an ffmpeg child process. Output is
//! signed 16-bit little-endian mono PCM at 24 kHz, emitted as an unframed
//! byte stream in whatever chunk sizes ffmpeg produces.
//!
//! One transcoder instance lives per open upstream transcription
//! connection; the conversation runtime replaces it on every reconnect.

use bytes::Bytes;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[derive(Debug)]
pub enum TranscoderEvent {
    /// A chunk of decoded PCM
    Data(Bytes),
    /// Clean exit after `finalize_input`; emitted at most once
    Finished,
    /// Fatal for the conversation; emitted at most once
    Error(String),
}

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("Transcoder input is closed")]
    NotReady,
    #[error("Failed to spawn transcoder process: {0}")]
    Spawn(String),
}

enum InputCommand {
    Chunk(Bytes),
    Finalize,
}

/// Factory for transcoding units; holds the resolved ffmpeg invocation
pub struct Transcoder {
    ffmpeg_path: String,
    args: Vec<String>,
}

impl Transcoder {
    pub fn new(config: &config::TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            args: decode_args(),
        }
    }

    /// Begin a fresh transcoding unit
    pub fn start(
        &self,
    ) -> Result<(TranscoderHandle, mpsc::UnboundedReceiver<TranscoderEvent>), TranscoderError>
    {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscoderError::Spawn(e.to_string()))?;

        let mut stdin = child.stdin.take().expect("transcoder stdin is piped");
        let mut stdout = child.stdout.take().expect("transcoder stdout is piped");
        let stderr = child.stderr.take().expect("transcoder stderr is piped");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<InputCommand>();
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        let ready = Arc::new(AtomicBool::new(true));
        let finalized = Arc::new(AtomicBool::new(false));

        // Input writer: owns stdin; dropping it signals EOF and makes the
        // process flush its output.
        let writer_ready = ready.clone();
        tokio::spawn(async move {
            while let Some(command) = input_rx.recv().await {
                match command {
                    InputCommand::Chunk(chunk) => {
                        if let Err(e) = stdin.write_all(&chunk).await {
                            warn!(error = %e, "Transcoder stdin write failed");
                            writer_ready.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                    InputCommand::Finalize => break,
                }
            }
            drop(stdin);
        });

        // Output pump: PCM chunks as they become available
        let data_tx = events_tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if data_tx
                            .send(TranscoderEvent::Data(Bytes::copy_from_slice(&buf[..n])))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Transcoder stdout read failed");
                        break;
                    }
                }
            }
        });

        // Diagnostics only
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "transcode", "ffmpeg: {line}");
            }
        });

        // Supervisor: the only emitter of Finished/Error, so each occurs
        // at most once and after all Data events.
        let supervisor_ready = ready.clone();
        let supervisor_finalized = finalized.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let _ = stdout_task.await;
                    supervisor_ready.store(false, Ordering::SeqCst);
                    match status {
                        Ok(status)
                            if status.success()
                                && supervisor_finalized.load(Ordering::SeqCst) =>
                        {
                            let _ = events_tx.send(TranscoderEvent::Finished);
                        }
                        Ok(status) => {
                            let _ = events_tx.send(TranscoderEvent::Error(format!(
                                "transcoder exited unexpectedly: {status}"
                            )));
                        }
                        Err(e) => {
                            let _ = events_tx.send(TranscoderEvent::Error(format!(
                                "failed to reap transcoder: {e}"
                            )));
                        }
                    }
                }
                _ = &mut kill_rx => {
                    supervisor_ready.store(false, Ordering::SeqCst);
                    stdout_task.abort();
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "Transcoder kill failed");
                    }
                    // Forced stop: no further events by contract
                }
            }
        });

        Ok((
            TranscoderHandle {
                input_tx,
                ready,
                finalized,
                kill_tx: Mutex::new(Some(kill_tx)),
            },
            events_rx,
        ))
    }
}

pub struct TranscoderHandle {
    input_tx: mpsc::UnboundedSender<InputCommand>,
    ready: Arc<AtomicBool>,
    finalized: Arc<AtomicBool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl TranscoderHandle {
    /// Enqueue one input chunk
    pub fn write_chunk(&self, chunk: Bytes) -> Result<(), TranscoderError> {
        if !self.is_ready_for_data() {
            return Err(TranscoderError::NotReady);
        }
        self.input_tx
            .send(InputCommand::Chunk(chunk))
            .map_err(|_| TranscoderError::NotReady)
    }

    /// True iff input is open and the transcoder has not errored
    pub fn is_ready_for_data(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Close input; the transcoder flushes and emits `Finished` exactly
    /// once on a clean exit
    pub fn finalize_input(&self) {
        self.finalized.store(true, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        let _ = self.input_tx.send(InputCommand::Finalize);
    }

    /// Forcibly terminate; no further events
    pub fn stop(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if let Some(kill_tx) = self.kill_tx.lock().unwrap().take() {
            let _ = kill_tx.send(());
        }
    }
}

fn decode_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        "pipe:0",
        "-f",
        "s16le",
        "-acodec",
        "pcm_s16le",
        "-ac",
        "1",
        "-ar",
        "24000",
        "pipe:1",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    /// A transcoder whose child copies stdin to stdout; exercises the
    /// pump machinery without depending on ffmpeg being installed.
    fn passthrough() -> Transcoder {
        Transcoder {
            ffmpeg_path: "cat".to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn decode_args_request_pcm16_mono_24khz() {
        let args = decode_args();
        let rendered = args.join(" ");
        assert!(rendered.contains("-f s16le"));
        assert!(rendered.contains("-ac 1"));
        assert!(rendered.contains("-ar 24000"));
        assert!(rendered.contains("-i pipe:0"));
    }

    #[tokio::test]
    async fn data_flows_and_finalize_emits_finished_once() {
        let (handle, mut events) = passthrough().start().unwrap();
        assert!(handle.is_ready_for_data());

        handle.write_chunk(Bytes::from_static(b"pcm-bytes")).unwrap();
        handle.finalize_input();

        let mut data = Vec::new();
        let mut finished = 0;
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
            match event {
                TranscoderEvent::Data(chunk) => data.extend_from_slice(&chunk),
                TranscoderEvent::Finished => finished += 1,
                TranscoderEvent::Error(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(data, b"pcm-bytes");
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn writes_after_finalize_are_rejected() {
        let (handle, mut events) = passthrough().start().unwrap();
        handle.finalize_input();

        assert!(!handle.is_ready_for_data());
        assert!(matches!(
            handle.write_chunk(Bytes::from_static(b"late")),
            Err(TranscoderError::NotReady)
        ));

        // Drain; a clean finalize still finishes
        let mut saw_finished = false;
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
            if matches!(event, TranscoderEvent::Finished) {
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn unexpected_exit_reports_error() {
        let transcoder = Transcoder {
            ffmpeg_path: "false".to_string(),
            args: Vec::new(),
        };
        let (_handle, mut events) = transcoder.start().unwrap();

        let mut saw_error = false;
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
            if matches!(event, TranscoderEvent::Error(_)) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn stop_suppresses_further_events() {
        let (handle, mut events) = passthrough().start().unwrap();
        handle.stop();
        assert!(!handle.is_ready_for_data());

        // The channel closes without Finished or Error
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
            assert!(
                matches!(event, TranscoderEvent::Data(_)),
                "unexpected lifecycle event after stop"
            );
        }
    }
}
