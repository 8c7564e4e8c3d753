use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::error::{CloseReason, SessionError};
use super::events::{CallerCommand, InboundEvent};
use super::state::SessionState;
use super::turn::{Turn, TurnBuffer};
use crate::core::agent::AgentConfig;
use crate::core::codec::{
    Admission, AudioEncoding, AudioFormat, AudioFrame, CallerFrame, CodecError, FrameCodec,
    SequenceReorderer,
};
use crate::core::realtime::{BackendEvent, BoxedBackend, SessionSetup};
use crate::core::tools::ToolError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_REORDER_WINDOW: usize = 64;

/// Capacity of the channel carrying tool results back into the session.
const TOOL_CHANNEL_CAPACITY: usize = 8;

/// Per-session timing and format settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub reorder_window: usize,
    /// Audio format negotiated with the backend, both directions
    pub backend_format: AudioFormat,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            reorder_window: DEFAULT_REORDER_WINDOW,
            backend_format: AudioFormat::g711_ulaw(),
        }
    }
}

/// Counters kept over a session's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Caller frames received
    pub frames_in: u64,
    /// Caller frames forwarded to the backend
    pub frames_forwarded: u64,
    /// Stale or duplicate caller frames dropped
    pub frames_dropped: u64,
    /// Frames released to the caller
    pub frames_out: u64,
    pub turns_released: u64,
    pub turns_withheld: u64,
    /// Tool results delivered to the backend, including tool errors
    pub tool_calls: u64,
    pub tool_errors: u64,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub final_state: SessionState,
    pub close_reason: Option<CloseReason>,
    pub stats: SessionStats,
}

#[derive(Debug)]
struct ToolCall {
    call_id: String,
    name: String,
    arguments: String,
}

struct ToolOutcome {
    call_id: String,
    name: String,
    result: Result<String, ToolError>,
}

/// Progress of the fallback utterance that replaces a withheld turn.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fallback {
    Idle,
    /// Requested from the backend, no output seen yet
    Requested,
    /// Being generated as this response
    Speaking(String),
}

struct PendingTool {
    call_id: String,
    name: String,
    handle: JoinHandle<()>,
}

/// One call bridged to one backend conversation.
///
/// The session is driven by explicit events: caller events, backend events
/// and tool completions all arrive on channels and are applied one at a time
/// by [`run`](Self::run), so no state is shared with callbacks. Tool handlers
/// run on their own tasks and report back through a channel, which keeps
/// audio flowing while a tool is pending.
pub struct Session {
    id: String,
    state: SessionState,
    agent: Arc<AgentConfig>,
    settings: SessionSettings,
    backend: BoxedBackend,
    codec: FrameCodec,
    reorderer: SequenceReorderer<CallerFrame>,
    caller_tx: mpsc::Sender<CallerCommand>,
    turn: TurnBuffer,
    fallback: Fallback,
    /// Response the caller talked over; its remaining output is dropped
    interrupted_response: Option<String>,
    pending_tool: Option<PendingTool>,
    queued_tools: VecDeque<ToolCall>,
    tool_tx: mpsc::Sender<ToolOutcome>,
    tool_rx: Option<mpsc::Receiver<ToolOutcome>>,
    cancel: CancellationToken,
    outbound_sequence: u64,
    last_activity: Instant,
    close_reason: Option<CloseReason>,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        agent: Arc<AgentConfig>,
        backend: BoxedBackend,
        caller_tx: mpsc::Sender<CallerCommand>,
        settings: SessionSettings,
    ) -> Self {
        let (tool_tx, tool_rx) = mpsc::channel(TOOL_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            state: SessionState::Connecting,
            agent,
            settings,
            backend,
            codec: FrameCodec::with_backend_sample_rate(settings.backend_format.sample_rate),
            reorderer: SequenceReorderer::new(settings.reorder_window),
            caller_tx,
            turn: TurnBuffer::new(),
            fallback: Fallback::Idle,
            interrupted_response: None,
            pending_tool: None,
            queued_tools: VecDeque::new(),
            tool_tx,
            tool_rx: Some(tool_rx),
            cancel: CancellationToken::new(),
            outbound_sequence: 0,
            last_activity: Instant::now(),
            close_reason: None,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Establishes the backend connection within the connect timeout.
    ///
    /// Failure is not retried; the caller is expected to close the session.
    pub async fn connect(&mut self) -> Result<mpsc::Receiver<BackendEvent>, SessionError> {
        if self.state != SessionState::Connecting {
            return Err(SessionError::Closed);
        }

        let setup = SessionSetup {
            session_id: self.id.clone(),
            instructions: self.agent.instructions.clone(),
            tools: self.agent.tool_specs(),
            audio_format: self.settings.backend_format,
        };

        let timeout = self.settings.connect_timeout;
        let events = match tokio::time::timeout(timeout, self.backend.connect(&setup)).await {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => return Err(SessionError::BackendConnect(e)),
            Err(_) => return Err(SessionError::ConnectTimeout(timeout)),
        };

        self.touch();
        self.transition(SessionState::Active);
        Ok(events)
    }

    /// Drives the session until it is closed, then returns its report.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundEvent>,
        mut backend_events: mpsc::Receiver<BackendEvent>,
    ) -> SessionReport {
        let Some(mut tool_rx) = self.tool_rx.take() else {
            self.close(CloseReason::Fatal(SessionError::Closed)).await;
            return self.report();
        };

        while self.state.is_open() {
            let idle_deadline = self.last_activity.checked_add(self.settings.idle_timeout);

            let step = tokio::select! {
                Some(outcome) = tool_rx.recv() => {
                    self.touch();
                    self.on_tool_outcome(outcome).await
                }

                event = inbound.recv() => match event {
                    Some(event) => {
                        self.touch();
                        self.on_inbound_event(event).await
                    }
                    None => {
                        self.close(CloseReason::CallerHangup).await;
                        Ok(())
                    }
                },

                event = backend_events.recv() => match event {
                    Some(event) => {
                        self.touch();
                        self.on_backend_event(event).await
                    }
                    None => {
                        self.close(CloseReason::BackendClosed("event stream ended".to_string()))
                            .await;
                        Ok(())
                    }
                },

                _ = idle_expired(idle_deadline) => {
                    warn!(
                        session_id = %self.id,
                        idle_secs = self.settings.idle_timeout.as_secs(),
                        "No activity within idle period"
                    );
                    self.close(CloseReason::IdleTimeout).await;
                    Ok(())
                }
            };

            if let Err(err) = step {
                self.close(CloseReason::Fatal(err)).await;
            }
        }

        self.report()
    }

    // =========================================================================
    // Caller side
    // =========================================================================

    pub async fn on_inbound_event(&mut self, event: InboundEvent) -> Result<(), SessionError> {
        self.ensure_open()?;

        match event {
            InboundEvent::Start {
                stream_id,
                format,
                first_sequence,
            } => {
                let encoding = FrameCodec::check_caller_format(&format)?;
                self.check_backend_compatible(encoding.caller_tag(), encoding)?;
                self.reorderer.expect_next(first_sequence);
                info!(
                    session_id = %self.id,
                    stream_id = %stream_id,
                    encoding = %format.encoding,
                    sample_rate = format.sample_rate,
                    "Caller stream started"
                );
            }
            InboundEvent::Media(frame) => self.on_inbound_frame(frame).await?,
            InboundEvent::Mark { name } => {
                debug!(session_id = %self.id, mark = %name, "Caller reached playback mark");
            }
            InboundEvent::Dtmf { digit } => {
                info!(session_id = %self.id, digit = %digit, "Caller pressed key");
            }
            InboundEvent::Stop => self.close(CloseReason::CallerHangup).await,
        }
        Ok(())
    }

    /// Forwards caller audio to the backend in sequence order.
    pub async fn on_inbound_frame(&mut self, frame: CallerFrame) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.stats.frames_in += 1;

        match self.reorderer.push(frame.sequence, frame) {
            Admission::Released(frames) => {
                for frame in frames {
                    self.forward_frame(&frame).await?;
                }
            }
            Admission::Stale { sequence, expected } => {
                self.stats.frames_dropped += 1;
                warn!(
                    session_id = %self.id,
                    sequence,
                    expected,
                    "Dropping stale or duplicate caller frame"
                );
            }
        }
        Ok(())
    }

    async fn forward_frame(&mut self, frame: &CallerFrame) -> Result<(), SessionError> {
        let audio = self.codec.to_backend_format(frame)?;
        self.check_backend_compatible(&frame.format.encoding, audio.format.encoding)?;
        self.backend.send_audio(&audio).await?;
        self.stats.frames_forwarded += 1;
        Ok(())
    }

    fn check_backend_compatible(
        &self,
        caller_tag: &str,
        encoding: AudioEncoding,
    ) -> Result<(), CodecError> {
        if encoding != self.settings.backend_format.encoding {
            return Err(CodecError::UnsupportedFormat(format!(
                "caller sends {caller_tag} but the backend session expects {}",
                self.settings.backend_format.encoding
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Backend side
    // =========================================================================

    pub async fn on_backend_event(&mut self, event: BackendEvent) -> Result<(), SessionError> {
        self.ensure_open()?;

        match event {
            BackendEvent::AudioDelta { response_id, audio } => {
                if self.accepts_output(&response_id) {
                    self.turn.push_audio(&response_id, audio);
                }
            }
            BackendEvent::TranscriptDelta { response_id, delta } => {
                if self.accepts_output(&response_id) {
                    self.turn.push_transcript_delta(&response_id, &delta);
                }
            }
            BackendEvent::TranscriptDone {
                response_id,
                transcript,
            } => {
                if self.accepts_output(&response_id) {
                    self.turn.set_transcript(&response_id, transcript);
                }
            }
            BackendEvent::TurnComplete { response_id } => {
                if self.interrupted_response.as_deref() == Some(response_id.as_str()) {
                    debug!(session_id = %self.id, response_id = %response_id, "Interrupted response finished");
                    self.forget_response(&response_id);
                } else {
                    self.complete_turn(&response_id).await?;
                }
            }
            BackendEvent::TurnAborted {
                response_id,
                status,
            } => self.abort_turn(&response_id, &status),
            BackendEvent::ToolCallRequest {
                call_id,
                name,
                arguments,
            } => self.request_tool(ToolCall {
                call_id,
                name,
                arguments,
            }),
            BackendEvent::SpeechStarted => self.barge_in().await,
            BackendEvent::Error { code, message } => {
                return Err(SessionError::BackendProtocol(format!("{code}: {message}")));
            }
            BackendEvent::Closed { reason } => {
                self.close(CloseReason::BackendClosed(reason)).await;
            }
        }
        Ok(())
    }

    /// Whether output for `response_id` goes into the turn buffer.
    fn accepts_output(&mut self, response_id: &str) -> bool {
        if self.interrupted_response.as_deref() == Some(response_id) {
            trace!(session_id = %self.id, response_id, "Dropping output of interrupted response");
            return false;
        }
        if self.fallback == Fallback::Requested {
            self.fallback = Fallback::Speaking(response_id.to_string());
        }
        true
    }

    /// Clears any bookkeeping tied to a response that has ended.
    fn forget_response(&mut self, response_id: &str) {
        if self.interrupted_response.as_deref() == Some(response_id) {
            self.interrupted_response = None;
        }
        if matches!(&self.fallback, Fallback::Speaking(id) if id == response_id) {
            self.fallback = Fallback::Idle;
        }
    }

    /// Drops a response that ended without completing. Its text is partial,
    /// so nothing of it reaches the caller.
    fn abort_turn(&mut self, response_id: &str, status: &str) {
        if let Some(turn) = self.turn.take(response_id) {
            info!(
                session_id = %self.id,
                response_id,
                status,
                audio_bytes = turn.audio_bytes(),
                "Discarding output of incomplete response"
            );
        }
        self.forget_response(response_id);
    }

    /// Evaluates a finished turn and either releases its audio or replaces
    /// it with the fallback utterance.
    async fn complete_turn(&mut self, response_id: &str) -> Result<(), SessionError> {
        let was_fallback = matches!(&self.fallback, Fallback::Speaking(id) if id == response_id);
        self.forget_response(response_id);

        let Some(turn) = self.turn.take(response_id) else {
            debug!(session_id = %self.id, response_id, "Response finished without output");
            return Ok(());
        };
        if turn.is_empty() {
            return Ok(());
        }

        let verdict = self.agent.guardrails.evaluate(&turn.text).await;
        if !verdict.tripped() {
            return self.release_turn(turn).await;
        }

        self.stats.turns_withheld += 1;
        let diagnostics = serde_json::to_string(&verdict.results).unwrap_or_default();
        warn!(
            session_id = %self.id,
            response_id,
            audio_bytes = turn.audio_bytes(),
            diagnostics = %diagnostics,
            "Turn withheld by output guardrail"
        );

        if was_fallback {
            warn!(session_id = %self.id, "Fallback utterance tripped a guardrail, staying silent");
            return Ok(());
        }

        self.backend.speak(&self.agent.fallback_utterance).await?;
        self.fallback = Fallback::Requested;
        Ok(())
    }

    async fn release_turn(&mut self, turn: Turn) -> Result<(), SessionError> {
        let chunks = turn.audio.len();
        for payload in turn.audio {
            self.outbound_sequence += 1;
            let frame = AudioFrame {
                payload,
                format: self.settings.backend_format,
                sequence: self.outbound_sequence,
                resample_to: None,
            };
            let caller_frame = self.codec.to_caller_format(&frame)?;
            self.send_to_caller(CallerCommand::Media(caller_frame)).await;
            self.stats.frames_out += 1;
        }

        self.send_to_caller(CallerCommand::Mark {
            name: turn.response_id.clone(),
        })
        .await;
        self.stats.turns_released += 1;
        debug!(
            session_id = %self.id,
            response_id = %turn.response_id,
            chunks,
            "Turn released to caller"
        );
        Ok(())
    }

    async fn barge_in(&mut self) {
        if let Some(turn) = self.turn.discard() {
            debug!(
                session_id = %self.id,
                response_id = %turn.response_id,
                audio_bytes = turn.audio_bytes(),
                "Caller interrupted, discarding unreleased turn"
            );
            self.interrupted_response = Some(turn.response_id);
        }
        self.send_to_caller(CallerCommand::Clear).await;
    }

    // =========================================================================
    // Tools
    // =========================================================================

    fn request_tool(&mut self, call: ToolCall) {
        if self.pending_tool.is_some() {
            debug!(
                session_id = %self.id,
                call_id = %call.call_id,
                tool = %call.name,
                "Tool call queued behind pending call"
            );
            self.queued_tools.push_back(call);
            return;
        }
        self.start_tool(call);
    }

    fn start_tool(&mut self, call: ToolCall) {
        self.transition(SessionState::ToolPending);
        info!(
            session_id = %self.id,
            call_id = %call.call_id,
            tool = %call.name,
            "Dispatching tool call"
        );

        let registry = self.agent.tools.clone();
        let tx = self.tool_tx.clone();
        let token = self.cancel.child_token();
        let call_id = call.call_id.clone();
        let name = call.name.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = registry.invoke_raw(&call.name, &call.arguments) => result,
            };
            let _ = tx
                .send(ToolOutcome {
                    call_id: call.call_id,
                    name: call.name,
                    result,
                })
                .await;
        });

        self.pending_tool = Some(PendingTool {
            call_id,
            name,
            handle,
        });
    }

    async fn on_tool_outcome(&mut self, outcome: ToolOutcome) -> Result<(), SessionError> {
        if !self.state.is_open() {
            debug!(session_id = %self.id, call_id = %outcome.call_id, "Discarding tool result after close");
            return Ok(());
        }

        let matches_pending = self
            .pending_tool
            .as_ref()
            .is_some_and(|pending| pending.call_id == outcome.call_id);
        if !matches_pending {
            warn!(session_id = %self.id, call_id = %outcome.call_id, "Discarding result for unknown tool call");
            return Ok(());
        }
        self.pending_tool = None;

        let output = match outcome.result {
            Ok(output) => {
                info!(session_id = %self.id, call_id = %outcome.call_id, tool = %outcome.name, "Tool call completed");
                output
            }
            Err(err) => {
                self.stats.tool_errors += 1;
                warn!(
                    session_id = %self.id,
                    call_id = %outcome.call_id,
                    tool = %outcome.name,
                    error = %err,
                    "Tool call failed, reporting to backend"
                );
                err.to_tool_output()
            }
        };

        self.backend.send_tool_result(&outcome.call_id, &output).await?;
        self.stats.tool_calls += 1;
        self.transition(SessionState::Active);

        if let Some(next) = self.queued_tools.pop_front() {
            self.start_tool(next);
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Closes the session. Later calls are no-ops.
    ///
    /// In-flight tool work is cancelled and its result discarded, frames still
    /// held for reordering are flushed to the backend when it can take them,
    /// then the backend is disconnected and the caller stream is told to close.
    pub async fn close(&mut self, reason: CloseReason) {
        if !self.state.is_open() {
            return;
        }

        match &reason {
            CloseReason::Fatal(err) => {
                error!(session_id = %self.id, error = %err, code = err.code(), "Session failed");
            }
            other => info!(session_id = %self.id, reason = %other, "Closing session"),
        }

        let was_connected = self.state != SessionState::Connecting;
        self.transition(SessionState::Closing);

        self.cancel.cancel();
        if let Some(pending) = self.pending_tool.take() {
            pending.handle.abort();
            debug!(
                session_id = %self.id,
                call_id = %pending.call_id,
                tool = %pending.name,
                "Cancelled in-flight tool call"
            );
        }
        self.queued_tools.clear();
        self.turn.discard();

        if was_connected && reason.backend_usable() {
            for frame in self.reorderer.drain() {
                if let Err(e) = self.forward_frame(&frame).await {
                    warn!(session_id = %self.id, error = %e, "Stopped draining held frames");
                    break;
                }
            }
        } else {
            self.reorderer.drain();
        }

        if let Err(e) = self.backend.disconnect().await {
            warn!(session_id = %self.id, error = %e, "Backend disconnect failed");
        }

        self.send_to_caller(CallerCommand::Close {
            code: reason.close_code(),
            reason: reason.code().to_string(),
        })
        .await;

        self.close_reason = Some(reason);
        self.transition(SessionState::Closed);
        info!(
            session_id = %self.id,
            frames_in = self.stats.frames_in,
            frames_out = self.stats.frames_out,
            turns_withheld = self.stats.turns_withheld,
            tool_calls = self.stats.tool_calls,
            "Session closed"
        );
    }

    /// Builds the report. Meaningful once the session is closed.
    pub fn report(&mut self) -> SessionReport {
        SessionReport {
            session_id: self.id.clone(),
            final_state: self.state,
            close_reason: self.close_reason.take(),
            stats: self.stats.clone(),
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state.is_open() {
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(session_id = %self.id, from = %self.state, to = %next, "Ignoring invalid state transition");
            return;
        }
        info!(session_id = %self.id, from = %self.state, to = %next, "Session state changed");
        self.state = next;
    }

    async fn send_to_caller(&self, command: CallerCommand) {
        if self.caller_tx.send(command).await.is_err() {
            debug!(session_id = %self.id, "Caller stream already gone");
        }
    }
}

/// Resolves at `deadline`. A deadline past the clock's range never fires.
async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(pending) = self.pending_tool.take() {
            pending.handle.abort();
        }
    }
}
