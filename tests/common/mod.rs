//! Scripted mock backend for session and gateway tests.
//!
//! A [`MockHandle`] records every call a session makes on its backend and
//! lets the test inject backend events.

// Not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use callbridge_gateway::core::agent::AgentConfig;
use callbridge_gateway::core::codec::{AudioFrame, CallerFrame, MediaFormat};
use callbridge_gateway::core::gateway::{GatewaySettings, SessionGateway};
use callbridge_gateway::core::guardrails::{BlocklistGuardrail, GuardrailChain};
use callbridge_gateway::core::realtime::{
    BackendEvent, BackendFactory, BoxedBackend, RealtimeBackend, RealtimeError, RealtimeResult,
    SessionSetup,
};
use callbridge_gateway::core::session::{CallerCommand, InboundEvent};
use callbridge_gateway::core::tools::{BoxError, ToolDefinition, ToolRegistry, builtin};

/// How long helpers wait for asynchronous effects before failing.
pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Connect { instructions: String, tools: Vec<String> },
    Audio { sequence: u64, payload: Bytes },
    ToolResult { call_id: String, output: String },
    Speak(String),
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    /// Never completes
    Hang,
}

/// Shared view of one mock backend.
#[derive(Clone, Default)]
pub struct MockHandle {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    events: Arc<Mutex<Option<mpsc::Sender<BackendEvent>>>>,
    /// When set, `speak` is recorded but produces no turn
    speech_muted: Arc<AtomicBool>,
}

impl MockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Stops `speak` from answering, so the test can script the spoken turn.
    pub fn mute_speech(&self) {
        self.speech_muted.store(true, Ordering::SeqCst);
    }

    pub fn disconnects(&self) -> usize {
        self.count(|call| matches!(call, BackendCall::Disconnect))
    }

    pub fn audio_sequences(&self) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Audio { sequence, .. } => Some(*sequence),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::ToolResult { call_id, output } => {
                    Some((call_id.clone(), output.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Sends a backend event to the session. Panics if not connected.
    pub async fn emit(&self, event: BackendEvent) {
        let sender = self.events.lock().clone().expect("backend not connected");
        sender.send(event).await.expect("session stopped reading events");
    }

    /// Emits a complete turn: transcript, audio chunks, then the boundary.
    pub async fn emit_turn(&self, response_id: &str, text: &str, chunks: &[&'static [u8]]) {
        self.emit(BackendEvent::TranscriptDelta {
            response_id: response_id.to_string(),
            delta: text.to_string(),
        })
        .await;
        for chunk in chunks {
            self.emit(BackendEvent::AudioDelta {
                response_id: response_id.to_string(),
                audio: Bytes::from_static(chunk),
            })
            .await;
        }
        self.emit(BackendEvent::TurnComplete {
            response_id: response_id.to_string(),
        })
        .await;
    }

    /// Closes the event stream as if the backend connection dropped.
    pub fn drop_events(&self) {
        self.events.lock().take();
    }

    pub fn is_connected(&self) -> bool {
        self.events.lock().is_some()
    }

    /// Polls until `predicate` holds or [`WAIT`] elapses.
    pub async fn wait_for(&self, predicate: impl Fn(&[BackendCall]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if predicate(&self.calls.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }
}

/// Backend whose behavior is scripted by the test.
pub struct MockBackend {
    handle: MockHandle,
    behavior: ConnectBehavior,
    spoken: usize,
}

impl MockBackend {
    pub fn new(handle: MockHandle, behavior: ConnectBehavior) -> Self {
        Self {
            handle,
            behavior,
            spoken: 0,
        }
    }
}

/// Audio the mock produces when asked to speak.
pub const SPOKEN_AUDIO: &[u8] = b"spoken";

#[async_trait]
impl RealtimeBackend for MockBackend {
    async fn connect(&mut self, setup: &SessionSetup) -> RealtimeResult<mpsc::Receiver<BackendEvent>> {
        self.handle.record(BackendCall::Connect {
            instructions: setup.instructions.clone(),
            tools: setup.tools.iter().map(|tool| tool.name.clone()).collect(),
        });
        match self.behavior {
            ConnectBehavior::Succeed => {
                let (tx, rx) = mpsc::channel(64);
                *self.handle.events.lock() = Some(tx);
                Ok(rx)
            }
            ConnectBehavior::Fail => Err(RealtimeError::ConnectionFailed(
                "connection refused".to_string(),
            )),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn send_audio(&mut self, frame: &AudioFrame) -> RealtimeResult<()> {
        self.handle.record(BackendCall::Audio {
            sequence: frame.sequence,
            payload: frame.payload.clone(),
        });
        Ok(())
    }

    async fn send_tool_result(&mut self, call_id: &str, output: &str) -> RealtimeResult<()> {
        self.handle.record(BackendCall::ToolResult {
            call_id: call_id.to_string(),
            output: output.to_string(),
        });
        Ok(())
    }

    async fn speak(&mut self, text: &str) -> RealtimeResult<()> {
        self.handle.record(BackendCall::Speak(text.to_string()));
        if self.handle.speech_muted.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.spoken += 1;
        let response_id = format!("spoken-{}", self.spoken);
        let sender = self.handle.events.lock().clone().ok_or(RealtimeError::NotConnected)?;
        let events = [
            BackendEvent::TranscriptDone {
                response_id: response_id.clone(),
                transcript: text.to_string(),
            },
            BackendEvent::AudioDelta {
                response_id: response_id.clone(),
                audio: Bytes::from_static(SPOKEN_AUDIO),
            },
            BackendEvent::TurnComplete { response_id },
        ];
        for event in events {
            sender
                .send(event)
                .await
                .map_err(|_| RealtimeError::NotConnected)?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.handle.record(BackendCall::Disconnect);
        self.handle.events.lock().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }
}

/// Factory handing every session a backend on the same handle.
pub fn mock_factory(handle: MockHandle, behavior: ConnectBehavior) -> BackendFactory {
    Arc::new(move || Ok(Box::new(MockBackend::new(handle.clone(), behavior)) as BoxedBackend))
}

/// Factory handing each new session the next handle in order.
pub fn sequential_factory(handles: Vec<MockHandle>) -> BackendFactory {
    let queue = Arc::new(Mutex::new(VecDeque::from(handles)));
    Arc::new(move || {
        let handle = queue
            .lock()
            .pop_front()
            .ok_or_else(|| RealtimeError::InvalidConfiguration("no mock backend left".to_string()))?;
        Ok(Box::new(MockBackend::new(handle, ConnectBehavior::Succeed)) as BoxedBackend)
    })
}

/// Tool whose handler always fails.
pub fn failing_tool() -> ToolDefinition {
    ToolDefinition::new(
        "lookup_records",
        "Looks up patient records.",
        json!({"type": "object", "properties": {}}),
        |_args: Value| async move { Err::<String, BoxError>(BoxError::from("records service down")) },
    )
}

/// Tool that takes far longer than any test waits.
pub fn slow_tool() -> ToolDefinition {
    ToolDefinition::new(
        "check_availability",
        "Checks the calendar.",
        json!({"type": "object", "properties": {}}),
        |_args: Value| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, BoxError>("free".to_string())
        },
    )
}

/// The veterinary agent plus the failing and slow tools.
pub fn test_agent() -> Arc<AgentConfig> {
    let tools = ToolRegistry::new()
        .with_tool(builtin::schedule_appointment())
        .and_then(|tools| tools.with_tool(failing_tool()))
        .and_then(|tools| tools.with_tool(slow_tool()))
        .unwrap();
    let guardrails = GuardrailChain::new().with(BlocklistGuardrail::new(
        "Blocklist terms",
        ["diagnosis", "discount", "cure", "refund"],
    ));
    Arc::new(
        AgentConfig::new("Triage Agent", "You are a helpful assistant at a veterinary office.")
            .with_tools(tools)
            .with_guardrails(guardrails),
    )
}

pub fn test_gateway(factory: BackendFactory, settings: GatewaySettings) -> Arc<SessionGateway> {
    Arc::new(SessionGateway::new(test_agent(), factory, settings))
}

/// Caller side of one session under test.
pub struct CallerSide {
    pub inbound: mpsc::Sender<InboundEvent>,
    pub commands: mpsc::Receiver<CallerCommand>,
}

impl CallerSide {
    pub async fn start(&self) {
        self.inbound
            .send(InboundEvent::Start {
                stream_id: "MZ0001".to_string(),
                format: MediaFormat::mulaw_8k(),
                first_sequence: 1,
            })
            .await
            .unwrap();
    }

    pub async fn send_frame(&self, sequence: u64, payload: &[u8]) {
        self.inbound
            .send(InboundEvent::Media(caller_frame(sequence, payload)))
            .await
            .unwrap();
    }

    /// Next command, failing the test after [`WAIT`].
    pub async fn next_command(&mut self) -> CallerCommand {
        tokio::time::timeout(WAIT, self.commands.recv())
            .await
            .expect("timed out waiting for caller command")
            .expect("caller command channel closed")
    }
}

pub fn caller_frame(sequence: u64, payload: &[u8]) -> CallerFrame {
    use base64::prelude::*;
    CallerFrame {
        payload: BASE64_STANDARD.encode(payload),
        format: MediaFormat::mulaw_8k(),
        sequence,
    }
}

pub fn caller_channels() -> (CallerSide, mpsc::Receiver<InboundEvent>, mpsc::Sender<CallerCommand>) {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (caller_tx, caller_rx) = mpsc::channel(64);
    (
        CallerSide {
            inbound: inbound_tx,
            commands: caller_rx,
        },
        inbound_rx,
        caller_tx,
    )
}
