//! Realtime STT session
//!
//! One live upstream transcription connection. The writer half pushes
//! configuration, PCM appends, and commits; a reader task decodes inbound
//! frames into `SttEvent`s for the conversation runtime. Reconnects and
//! backoff live in the runtime, not here.

use futures_util::SinkExt;
use futures_util::StreamExt;
use providers::realtime::{
    encode_frame, InboundFrame, OutboundFrame, RealtimeEndpoint, TranscriptionSessionConfig,
    WsSink,
};
use providers::ProviderError;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

#[derive(Debug)]
pub enum SttEvent {
    /// A finalized utterance
    Completed { transcript: String },
    /// Per-frame upstream error; non-fatal
    UpstreamError(String),
    /// The connection is gone. `normal` distinguishes a deliberate close
    /// (code 1000) from a failure that warrants a reconnect.
    Closed { normal: bool },
}

pub struct SttSession {
    sink: WsSink,
}

impl SttSession {
    /// Dial the upstream, send the session configuration, and start the
    /// reader task.
    pub async fn connect(
        endpoint: &RealtimeEndpoint,
        session_config: TranscriptionSessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SttEvent>), ProviderError> {
        let (mut sink, mut source) = endpoint.connect().await?;

        sink.send(encode_frame(&OutboundFrame::SessionUpdate {
            session: session_config,
        })?)
        .await
        .map_err(|e| ProviderError::WebSocketError(e.to_string()))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut closed_sent = false;
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<InboundFrame>(&text) {
                        Ok(InboundFrame::SessionCreated { .. }) => {
                            debug!("Transcription session created");
                        }
                        Ok(InboundFrame::TranscriptionCompleted { transcript, .. }) => {
                            if events_tx
                                .send(SttEvent::Completed { transcript })
                                .is_err()
                            {
                                break;
                            }
                        }
                        Ok(InboundFrame::Error { error }) => {
                            warn!(error = %error, "Upstream transcription error frame");
                            if events_tx
                                .send(SttEvent::UpstreamError(error.to_string()))
                                .is_err()
                            {
                                break;
                            }
                        }
                        Ok(other) => trace!(frame = ?other, "Ignoring upstream frame"),
                        Err(e) => warn!(error = %e, "Undecodable upstream frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        let normal = frame
                            .map(|f| f.code == CloseCode::Normal)
                            .unwrap_or(false);
                        let _ = events_tx.send(SttEvent::Closed { normal });
                        closed_sent = true;
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Transcription socket read failed");
                        let _ = events_tx.send(SttEvent::Closed { normal: false });
                        closed_sent = true;
                        break;
                    }
                }
            }

            if !closed_sent {
                // Stream ended without a close frame
                let _ = events_tx.send(SttEvent::Closed { normal: false });
            }
        });

        Ok((Self { sink }, events_rx))
    }

    /// Forward one base64-encoded PCM chunk
    pub async fn append_audio(&mut self, audio_base64: String) -> Result<(), ProviderError> {
        self.sink
            .send(encode_frame(&OutboundFrame::Append {
                audio: audio_base64,
            })?)
            .await
            .map_err(|e| ProviderError::WebSocketError(e.to_string()))
    }

    /// Commit the input buffer; sent once per transcoder finish
    pub async fn commit(&mut self) -> Result<(), ProviderError> {
        self.sink
            .send(encode_frame(&OutboundFrame::Commit)?)
            .await
            .map_err(|e| ProviderError::WebSocketError(e.to_string()))
    }

    /// Deliberately close the connection
    pub async fn close(mut self) {
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!(error = %e, "Close frame send failed");
        }
    }
}
