//! OpenAI Realtime API client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::header::{AUTHORIZATION, HeaderValue};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use tracing::{debug, info, trace, warn};

use super::config::OpenAIRealtimeConfig;
use super::messages::{
    ClientEvent, ConversationItem, ResponseConfig, ServerEvent, SessionConfig, ToolDef,
    TurnDetection,
};
use crate::core::codec::AudioFrame;
use crate::core::realtime::base::{
    BackendEvent, BackendFactory, BoxedBackend, RealtimeBackend, RealtimeError, RealtimeResult,
    SessionSetup,
};

/// Capacity of the outgoing client-event channel.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the backend-event channel handed to the session.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `disconnect` waits for the close handshake before aborting.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// `response.status` of a response that ran to completion.
const RESPONSE_COMPLETED: &str = "completed";

/// OpenAI Realtime API backend.
///
/// One instance serves exactly one session. The WebSocket is driven by a
/// spawned task that serializes outgoing [`ClientEvent`]s and translates
/// incoming server events into [`BackendEvent`]s.
pub struct OpenAIRealtime {
    config: OpenAIRealtimeConfig,
    ws_sender: Option<mpsc::Sender<ClientEvent>>,
    connection_handle: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl OpenAIRealtime {
    pub fn new(config: OpenAIRealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "OpenAI API key is required".to_string(),
            ));
        }

        Ok(Self {
            config,
            ws_sender: None,
            connection_handle: None,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Factory building one backend per session from a shared config.
    pub fn factory(config: OpenAIRealtimeConfig) -> BackendFactory {
        Arc::new(move || Ok(Box::new(OpenAIRealtime::new(config.clone())?) as BoxedBackend))
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let mut request = self
            .config
            .ws_url()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid API key: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }

    fn build_session_config(&self, setup: &SessionSetup) -> SessionConfig {
        let format = setup.audio_format.encoding.as_str().to_string();
        let tools: Vec<ToolDef> = setup.tools.iter().map(ToolDef::from).collect();

        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(setup.instructions.clone()),
            voice: Some(self.config.voice.as_str().to_string()),
            input_audio_format: Some(format.clone()),
            output_audio_format: Some(format),
            turn_detection: Some(TurnDetection::ServerVad {
                threshold: None,
                prefix_padding_ms: None,
                silence_duration_ms: None,
                interrupt_response: Some(true),
            }),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
            tools: (!tools.is_empty()).then_some(tools),
        }
    }

    /// Send an event to the WebSocket.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        let sender = self.ws_sender.as_ref().ok_or(RealtimeError::NotConnected)?;
        sender
            .send(event)
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }
}

#[async_trait]
impl RealtimeBackend for OpenAIRealtime {
    async fn connect(&mut self, setup: &SessionSetup) -> RealtimeResult<mpsc::Receiver<BackendEvent>> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(RealtimeError::ConnectionFailed("already connected".to_string()));
        }

        let request = self.build_request()?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| match e {
                tungstenite::Error::Http(response)
                    if response.status() == http::StatusCode::UNAUTHORIZED =>
                {
                    RealtimeError::AuthenticationFailed("OpenAI rejected the API key".to_string())
                }
                other => RealtimeError::ConnectionFailed(other.to_string()),
            })?;

        info!(session_id = %setup.session_id, model = %self.config.model, "Connected to OpenAI Realtime API");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel::<BackendEvent>(EVENT_CHANNEL_CAPACITY);

        let connected = self.connected.clone();
        connected.store(true, Ordering::SeqCst);
        let session_id = setup.session_id.clone();

        let handle = tokio::spawn(async move {
            let mut translator = EventTranslator::default();

            let reason = 'conn: loop {
                tokio::select! {
                    outgoing = rx.recv() => match outgoing {
                        Some(event) => {
                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    warn!(session_id = %session_id, "Failed to serialize event: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                break 'conn format!("send failed: {e}");
                            }
                        }
                        None => {
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break 'conn "client disconnected".to_string();
                        }
                    },

                    incoming = ws_stream.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            for event in translator.translate(text.as_str()) {
                                if events_tx.send(event).await.is_err() {
                                    break 'conn "session dropped".to_string();
                                }
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            let event = BackendEvent::protocol_error(format!(
                                "unexpected binary message ({} bytes)",
                                data.len()
                            ));
                            if events_tx.send(event).await.is_err() {
                                break 'conn "session dropped".to_string();
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                break 'conn format!("failed to send pong: {e}");
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break 'conn frame
                                .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                                .unwrap_or_else(|| "closed by server".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => break 'conn format!("WebSocket error: {e}"),
                        None => break 'conn "stream ended".to_string(),
                    },
                }
            };

            connected.store(false, Ordering::SeqCst);
            debug!(session_id = %session_id, reason = %reason, "OpenAI Realtime connection task ended");
            let _ = events_tx.send(BackendEvent::Closed { reason }).await;
        });

        self.ws_sender = Some(tx);
        self.connection_handle = Some(handle);

        let session = self.build_session_config(setup);
        self.send_event(ClientEvent::SessionUpdate { session }).await?;

        Ok(events_rx)
    }

    async fn send_audio(&mut self, frame: &AudioFrame) -> RealtimeResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::audio_append(&frame.payload)).await
    }

    async fn send_tool_result(&mut self, call_id: &str, output: &str) -> RealtimeResult<()> {
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
        })
        .await?;
        self.send_event(ClientEvent::ResponseCreate { response: None })
            .await
    }

    async fn speak(&mut self, text: &str) -> RealtimeResult<()> {
        let response = ResponseConfig {
            modalities: None,
            instructions: Some(format!(
                "Say exactly the following to the caller and nothing else: \"{text}\""
            )),
            tool_choice: Some("none".to_string()),
        };
        self.send_event(ClientEvent::ResponseCreate {
            response: Some(response),
        })
        .await
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        // Dropping the sender asks the connection task to close the socket.
        self.ws_sender = None;

        if let Some(mut handle) = self.connection_handle.take()
            && tokio::time::timeout(DISCONNECT_GRACE, &mut handle).await.is_err()
        {
            handle.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for OpenAIRealtime {
    fn drop(&mut self) {
        if let Some(handle) = self.connection_handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Server event translation
// =============================================================================

/// Translates raw server messages into backend events.
///
/// Keeps the call-id to function-name mapping announced by
/// `response.output_item.added` so tool calls can be named even when the
/// arguments event omits the name.
#[derive(Debug, Default)]
pub(crate) struct EventTranslator {
    pending_function_calls: HashMap<String, String>,
}

impl EventTranslator {
    pub(crate) fn translate(&mut self, text: &str) -> Vec<BackendEvent> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return vec![BackendEvent::protocol_error(format!("undecodable message: {e}"))],
        };

        if value.get("type").and_then(Value::as_str).is_none() {
            return vec![BackendEvent::protocol_error("message has no type")];
        }

        let event = match serde_json::from_value::<ServerEvent>(value) {
            Ok(event) => event,
            Err(e) => {
                return vec![BackendEvent::protocol_error(format!(
                    "unexpected message shape: {e}"
                ))];
            }
        };

        match event {
            ServerEvent::Error { error } => vec![BackendEvent::Error {
                code: error.code.unwrap_or(error.error_type),
                message: error.message,
            }],
            ServerEvent::SessionCreated { session } | ServerEvent::SessionUpdated { session } => {
                debug!(backend_session = %session.id, "OpenAI session configured");
                Vec::new()
            }
            ServerEvent::SpeechStarted { .. } => vec![BackendEvent::SpeechStarted],
            ServerEvent::OutputItemAdded { item, .. } => {
                if item.item_type == "function_call"
                    && let (Some(call_id), Some(name)) = (item.call_id, item.name)
                {
                    self.pending_function_calls.insert(call_id, name);
                }
                Vec::new()
            }
            ServerEvent::AudioDelta { response_id, delta } => {
                match ServerEvent::decode_audio_delta(&delta) {
                    Ok(audio) => vec![BackendEvent::AudioDelta {
                        response_id,
                        audio: Bytes::from(audio),
                    }],
                    Err(e) => vec![BackendEvent::protocol_error(format!(
                        "malformed audio delta: {e}"
                    ))],
                }
            }
            ServerEvent::AudioTranscriptDelta { response_id, delta } => {
                vec![BackendEvent::TranscriptDelta { response_id, delta }]
            }
            ServerEvent::AudioTranscriptDone {
                response_id,
                transcript,
            } => vec![BackendEvent::TranscriptDone {
                response_id,
                transcript,
            }],
            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
                ..
            } => {
                let announced = self.pending_function_calls.remove(&call_id);
                let name = name.or(announced).unwrap_or_else(|| {
                    warn!(call_id = %call_id, "Function call arrived without a name");
                    String::new()
                });
                vec![BackendEvent::ToolCallRequest {
                    call_id,
                    name,
                    arguments,
                }]
            }
            ServerEvent::ResponseDone { response } => match response.status.as_deref() {
                None | Some(RESPONSE_COMPLETED) => vec![BackendEvent::TurnComplete {
                    response_id: response.id,
                }],
                Some(status) => {
                    debug!(response_id = %response.id, status, "Response did not complete");
                    vec![BackendEvent::TurnAborted {
                        response_id: response.id.clone(),
                        status: status.to_string(),
                    }]
                }
            },
            ServerEvent::Unknown => {
                trace!("Ignoring unhandled server event");
                Vec::new()
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
