//! Per-conversation runtime
//!
//! One task owns everything live about a conversation: the upstream
//! transcription connection, the audio transcoder, the pause flag, and the
//! backoff counters. The rest of the system talks to it through a command
//! channel, so all of that state is accessed serially and nothing else can
//! hold it across a teardown.

use crate::hub::{NotificationHub, ServerEvent};
use crate::pipeline::TranscriptPipeline;
use crate::stt::{SttEvent, SttSession};
use crate::transcode::{Transcoder, TranscoderEvent, TranscoderHandle};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use providers::realtime::{RealtimeEndpoint, TranscriptionSessionConfig};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_BACKOFF_SECS: u64 = 30;

#[derive(Debug)]
pub enum RuntimeCommand {
    AppendAudio(Bytes),
    FinalizeInput,
    Pause,
    Resume,
    Shutdown,
}

/// Upstream connection state as reported to audio-channel clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "openai_disconnected",
            ConnectionStatus::Connecting => "openai_connecting",
            ConnectionStatus::Connected => "openai_connected",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionStatus::Connected,
            1 => ConnectionStatus::Connecting,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

/// Handle held by the coordinator; the runtime state itself never leaves
/// its task.
#[derive(Clone)]
pub struct RuntimeHandle {
    cmd_tx: mpsc::UnboundedSender<RuntimeCommand>,
    status: Arc<AtomicU8>,
}

impl RuntimeHandle {
    pub fn send(&self, command: RuntimeCommand) -> bool {
        self.cmd_tx.send(command).is_ok()
    }

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }
}

/// Everything a runtime needs from the outside
pub struct RuntimeContext {
    pub conversation_id: Uuid,
    pub endpoint: RealtimeEndpoint,
    pub transcription_model: String,
    pub transcoder: Arc<Transcoder>,
    pub pipeline: Arc<TranscriptPipeline>,
    pub hub: Arc<NotificationHub>,
}

pub fn spawn(ctx: RuntimeContext) -> RuntimeHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let status = Arc::new(AtomicU8::new(ConnectionStatus::Disconnected as u8));

    let handle = RuntimeHandle {
        cmd_tx,
        status: status.clone(),
    };

    tokio::spawn(run(ctx, cmd_rx, status));
    handle
}

/// Exponential backoff: min(30 s, 2^attempts × 1 s)
pub fn backoff_delay(attempts: u32) -> Duration {
    Duration::from_secs(MAX_BACKOFF_SECS.min(2u64.saturating_pow(attempts)))
}

async fn run(
    ctx: RuntimeContext,
    mut cmd_rx: mpsc::UnboundedReceiver<RuntimeCommand>,
    status: Arc<AtomicU8>,
) {
    let conversation_id = ctx.conversation_id;
    let mut paused = false;
    let mut attempts: u32 = 0;
    let mut transcoder: Option<TranscoderHandle> = None;
    let mut transcoder_events: Option<mpsc::UnboundedReceiver<TranscoderEvent>> = None;
    let mut stt: Option<SttSession> = None;
    let mut stt_events: Option<mpsc::UnboundedReceiver<SttEvent>> = None;
    // Armed for an immediate first connect
    let mut reconnect_at: Option<Instant> = Some(Instant::now());

    // Completed utterances are handed to a single worker so one
    // conversation's utterances flow through the pipeline in arrival order.
    let (utterance_tx, mut utterance_rx) = mpsc::unbounded_channel::<String>();
    {
        let pipeline = ctx.pipeline.clone();
        tokio::spawn(async move {
            while let Some(transcript) = utterance_rx.recv().await {
                pipeline.process_utterance(conversation_id, &transcript).await;
            }
        });
    }

    info!(conversation_id = %conversation_id, "Conversation runtime started");

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                match command {
                    Some(RuntimeCommand::AppendAudio(chunk)) => {
                        match &transcoder {
                            Some(handle) if handle.is_ready_for_data() => {
                                if let Err(e) = handle.write_chunk(chunk) {
                                    warn!(error = %e, conversation_id = %conversation_id, "Audio chunk rejected");
                                }
                            }
                            _ => {
                                debug!(conversation_id = %conversation_id, "Dropping audio chunk: transcoder not ready");
                            }
                        }
                    }
                    Some(RuntimeCommand::FinalizeInput) => {
                        if let Some(handle) = &transcoder {
                            handle.finalize_input();
                        }
                    }
                    Some(RuntimeCommand::Pause) => paused = true,
                    Some(RuntimeCommand::Resume) => paused = false,
                    Some(RuntimeCommand::Shutdown) | None => break,
                }
            }

            event = recv_opt(&mut transcoder_events), if transcoder_events.is_some() => {
                match event {
                    Some(TranscoderEvent::Data(pcm)) => {
                        // A pause is a mute: paused chunks are dropped, never
                        // buffered for later replay.
                        if paused {
                            continue;
                        }
                        let Some(session) = stt.as_mut() else { continue };
                        if let Err(e) = session.append_audio(BASE64.encode(&pcm)).await {
                            warn!(error = %e, conversation_id = %conversation_id, "PCM forward failed");
                            drop(stt.take());
                            stt_events = None;
                            schedule_retry(&ctx, &status, &mut attempts, &mut reconnect_at).await;
                        }
                    }
                    Some(TranscoderEvent::Finished) => {
                        if let Some(session) = stt.as_mut() {
                            if let Err(e) = session.commit().await {
                                warn!(error = %e, conversation_id = %conversation_id, "Commit failed");
                                drop(stt.take());
                                stt_events = None;
                                schedule_retry(&ctx, &status, &mut attempts, &mut reconnect_at).await;
                                continue;
                            }
                        }
                        // The finished unit is done; decode any further
                        // client audio with a fresh one.
                        transcoder_events = None;
                        match ctx.transcoder.start() {
                            Ok((handle, events)) => {
                                transcoder = Some(handle);
                                transcoder_events = Some(events);
                            }
                            Err(e) => {
                                warn!(error = %e, conversation_id = %conversation_id, "Transcoder restart failed");
                                transcoder = None;
                            }
                        }
                    }
                    Some(TranscoderEvent::Error(message)) => {
                        warn!(conversation_id = %conversation_id, error = %message, "Transcoder failed");
                        ctx.hub
                            .broadcast(conversation_id, &ServerEvent::error("Audio transcoding failed"))
                            .await;
                        break;
                    }
                    None => {
                        transcoder_events = None;
                    }
                }
            }

            event = recv_opt(&mut stt_events), if stt_events.is_some() => {
                match event {
                    Some(SttEvent::Completed { transcript }) => {
                        let _ = utterance_tx.send(transcript);
                    }
                    Some(SttEvent::UpstreamError(message)) => {
                        // Non-fatal per frame; a broken connection surfaces
                        // as a close instead
                        warn!(conversation_id = %conversation_id, error = %message, "Upstream error frame");
                    }
                    Some(SttEvent::Closed { normal: true }) => {
                        info!(conversation_id = %conversation_id, "Upstream closed normally");
                        drop(stt.take());
                        stt_events = None;
                        status.store(ConnectionStatus::Disconnected as u8, Ordering::SeqCst);
                        ctx.hub
                            .broadcast(conversation_id, &ServerEvent::OpenaiDisconnected)
                            .await;
                    }
                    Some(SttEvent::Closed { normal: false }) | None => {
                        drop(stt.take());
                        stt_events = None;
                        schedule_retry(&ctx, &status, &mut attempts, &mut reconnect_at).await;
                    }
                }
            }

            _ = sleep_opt(reconnect_at), if reconnect_at.is_some() => {
                reconnect_at = None;

                // A reconnect that fires with nobody listening goes
                // terminal instead of keeping an orphaned session alive.
                if ctx.hub.client_count(conversation_id).await == 0 && attempts > 0 {
                    info!(conversation_id = %conversation_id, "No clients at reconnect time; stopping");
                    break;
                }

                status.store(ConnectionStatus::Connecting as u8, Ordering::SeqCst);
                let session_config =
                    TranscriptionSessionConfig::for_model(&ctx.transcription_model);

                match SttSession::connect(&ctx.endpoint, session_config).await {
                    Ok((session, events)) => {
                        attempts = 0;
                        stt = Some(session);
                        stt_events = Some(events);

                        // Fresh transcoder for the fresh connection
                        if let Some(old) = transcoder.take() {
                            old.stop();
                        }
                        match ctx.transcoder.start() {
                            Ok((handle, events)) => {
                                transcoder = Some(handle);
                                transcoder_events = Some(events);
                            }
                            Err(e) => {
                                warn!(error = %e, conversation_id = %conversation_id, "Transcoder start failed");
                                ctx.hub
                                    .broadcast(
                                        conversation_id,
                                        &ServerEvent::error("Audio transcoding unavailable"),
                                    )
                                    .await;
                                break;
                            }
                        }

                        status.store(ConnectionStatus::Connected as u8, Ordering::SeqCst);
                        info!(conversation_id = %conversation_id, "Upstream transcription connected");
                        ctx.hub
                            .broadcast(conversation_id, &ServerEvent::OpenaiConnected)
                            .await;
                    }
                    Err(e) => {
                        warn!(error = %e, conversation_id = %conversation_id, "Upstream connect failed");
                        schedule_retry(&ctx, &status, &mut attempts, &mut reconnect_at).await;
                    }
                }
            }
        }
    }

    // Teardown: both long-lived resources are exclusively ours
    if let Some(handle) = transcoder.take() {
        handle.stop();
    }
    if let Some(session) = stt.take() {
        session.close().await;
    }
    status.store(ConnectionStatus::Disconnected as u8, Ordering::SeqCst);
    info!(conversation_id = %conversation_id, "Conversation runtime stopped");
}

async fn recv_opt<T>(receiver: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Enter cooldown: bump the attempt counter, announce the retry, and arm
/// the reconnect timer. No PCM is forwarded until the next open.
async fn schedule_retry(
    ctx: &RuntimeContext,
    status: &AtomicU8,
    attempts: &mut u32,
    reconnect_at: &mut Option<Instant>,
) {
    *attempts += 1;
    let delay = backoff_delay(*attempts);
    status.store(ConnectionStatus::Connecting as u8, Ordering::SeqCst);
    *reconnect_at = Some(Instant::now() + delay);

    warn!(
        attempts = *attempts,
        delay_secs = delay.as_secs(),
        conversation_id = %ctx.conversation_id,
        "Scheduling upstream reconnect"
    );
    ctx.hub
        .broadcast(
            ctx.conversation_id,
            &ServerEvent::error("Transcription connection lost, retrying"),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps_at_thirty_seconds() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(6), Duration::from_secs(30));
        assert_eq!(backoff_delay(64), Duration::from_secs(30));
    }

    #[test]
    fn backoff_is_non_decreasing() {
        let mut last = Duration::ZERO;
        for attempts in 1..40 {
            let delay = backoff_delay(attempts);
            assert!(delay >= last);
            assert!(delay <= Duration::from_secs(30));
            last = delay;
        }
    }

    #[test]
    fn connection_status_strings_match_protocol() {
        assert_eq!(ConnectionStatus::Connected.as_str(), "openai_connected");
        assert_eq!(ConnectionStatus::Connecting.as_str(), "openai_connecting");
        assert_eq!(
            ConnectionStatus::Disconnected.as_str(),
            "openai_disconnected"
        );
        assert_eq!(
            ConnectionStatus::from_u8(ConnectionStatus::Connected as u8),
            ConnectionStatus::Connected
        );
    }
}
