//! Twilio media stream WebSocket handler
//!
//! Bridges one Twilio Media Streams connection to one gateway session: a
//! reader task turns Twilio events into [`InboundEvent`]s, a writer task turns
//! [`CallerCommand`]s back into Twilio messages, and the session itself runs
//! on the connection task until it closes.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::messages::{
    MAX_TWILIO_MESSAGE_SIZE, MarkPayload, OutboundMedia, TwilioInbound, TwilioOutbound,
};
use crate::core::SessionPermit;
use crate::core::codec::{CallerFrame, MediaFormat};
use crate::core::session::{CallerCommand, InboundEvent};
use crate::state::AppState;

/// Channel buffer size; 20 ms frames give a few seconds of slack
const CHANNEL_BUFFER_SIZE: usize = 256;

/// First value of Twilio's per-stream media chunk counter
const FIRST_CHUNK: u64 = 1;

/// Media stream WebSocket handler
///
/// Refuses the upgrade with 503 when the gateway is at its session limit.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(permit) = state.gateway.try_admit() else {
        warn!(
            active = state.gateway.active_sessions(),
            "Refusing media stream, session limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Session limit reached").into_response();
    };

    ws.max_message_size(MAX_TWILIO_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, permit))
}

async fn handle_media_stream(socket: WebSocket, state: Arc<AppState>, permit: SessionPermit) {
    let _permit = permit;
    debug!("Media stream WebSocket connection established");

    let (sender, receiver) = socket.split();
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundEvent>(CHANNEL_BUFFER_SIZE);
    let (caller_tx, caller_rx) = mpsc::channel::<CallerCommand>(CHANNEL_BUFFER_SIZE);
    let stream_sid = Arc::new(Mutex::new(None::<String>));

    let writer = tokio::spawn(write_caller_commands(sender, caller_rx, stream_sid.clone()));
    let reader = tokio::spawn(read_twilio_events(
        receiver,
        inbound_tx,
        StreamTranslator::new(stream_sid),
    ));

    let report = state.gateway.accept_connection(inbound_rx, caller_tx).await;
    info!(
        session_id = %report.session_id,
        final_state = %report.final_state,
        close_reason = report.close_reason.as_ref().map(|r| r.code()).unwrap_or("none"),
        frames_in = report.stats.frames_in,
        frames_out = report.stats.frames_out,
        turns_released = report.stats.turns_released,
        turns_withheld = report.stats.turns_withheld,
        tool_calls = report.stats.tool_calls,
        "Media stream finished"
    );

    reader.abort();
    if let Err(e) = writer.await
        && !e.is_cancelled()
    {
        error!("Media stream writer task failed: {}", e);
    }
}

async fn read_twilio_events(
    mut receiver: SplitStream<WebSocket>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    mut translator: StreamTranslator,
) {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => {
                debug!("Ignoring binary frame of {} bytes", data.len());
                continue;
            }
            Ok(Message::Close(_)) => {
                debug!("Twilio closed the media stream");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Media stream WebSocket error: {}", e);
                break;
            }
        };

        let parsed: TwilioInbound = match serde_json::from_str(text.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring unparsable media stream message: {}", e);
                continue;
            }
        };

        if let Some(event) = translator.translate(parsed)
            && inbound_tx.send(event).await.is_err()
        {
            break;
        }
    }
}

async fn write_caller_commands(
    mut sender: SplitSink<WebSocket, Message>,
    mut caller_rx: mpsc::Receiver<CallerCommand>,
    stream_sid: Arc<Mutex<Option<String>>>,
) {
    while let Some(command) = caller_rx.recv().await {
        let closing = matches!(command, CallerCommand::Close { .. });
        let sid = stream_sid.lock().clone();

        let Some(message) = encode_command(command, sid.as_deref()) else {
            debug!("Dropping caller command sent before the stream started");
            continue;
        };

        if let Err(e) = sender.send(message).await {
            debug!("Failed to send media stream message: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
}

/// Turns a session command into a WebSocket message. Stream-addressed
/// commands need the stream SID and are dropped without one.
fn encode_command(command: CallerCommand, stream_sid: Option<&str>) -> Option<Message> {
    let outbound = match command {
        CallerCommand::Close { code, reason } => {
            return Some(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })));
        }
        CallerCommand::Media(frame) => TwilioOutbound::Media {
            stream_sid: stream_sid?.to_string(),
            media: OutboundMedia {
                payload: frame.payload,
            },
        },
        CallerCommand::Mark { name } => TwilioOutbound::Mark {
            stream_sid: stream_sid?.to_string(),
            mark: MarkPayload { name },
        },
        CallerCommand::Clear => TwilioOutbound::Clear {
            stream_sid: stream_sid?.to_string(),
        },
    };

    match serde_json::to_string(&outbound) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to serialize outgoing media stream message: {}", e);
            None
        }
    }
}

/// Per-connection state needed to turn Twilio messages into session events.
struct StreamTranslator {
    format: MediaFormat,
    stream_sid: Arc<Mutex<Option<String>>>,
}

impl StreamTranslator {
    fn new(stream_sid: Arc<Mutex<Option<String>>>) -> Self {
        Self {
            format: MediaFormat::mulaw_8k(),
            stream_sid,
        }
    }

    fn translate(&mut self, message: TwilioInbound) -> Option<InboundEvent> {
        match message {
            TwilioInbound::Connected { protocol, version } => {
                debug!(?protocol, ?version, "Media stream connected");
                None
            }
            TwilioInbound::Start {
                stream_sid, start, ..
            } => {
                info!(
                    stream_sid = %stream_sid,
                    call_sid = start.call_sid.as_deref().unwrap_or(""),
                    "Media stream started"
                );
                *self.stream_sid.lock() = Some(stream_sid.clone());
                self.format = start.media_format.clone();
                Some(InboundEvent::Start {
                    stream_id: stream_sid,
                    format: start.media_format,
                    first_sequence: FIRST_CHUNK,
                })
            }
            TwilioInbound::Media { media, .. } => {
                if media.is_outbound_track() {
                    return None;
                }
                let Some(sequence) = media.chunk_number() else {
                    warn!(chunk = ?media.chunk, "Ignoring media message without a chunk number");
                    return None;
                };
                Some(InboundEvent::Media(CallerFrame {
                    payload: media.payload,
                    format: self.format.clone(),
                    sequence,
                }))
            }
            TwilioInbound::Mark { mark, .. } => Some(InboundEvent::Mark { name: mark.name }),
            TwilioInbound::Dtmf { dtmf, .. } => Some(InboundEvent::Dtmf { digit: dtmf.digit }),
            TwilioInbound::Stop { .. } => Some(InboundEvent::Stop),
            TwilioInbound::Unknown => {
                debug!("Ignoring unknown media stream event");
                None
            }
        }
    }
}
