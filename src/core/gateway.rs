//! Accepts caller streams and runs one session per call.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{error, info};
use uuid::Uuid;

use crate::core::agent::AgentConfig;
use crate::core::realtime::BackendFactory;
use crate::core::session::{
    CallerCommand, CloseReason, InboundEvent, Session, SessionError, SessionReport,
    SessionSettings, SessionState, SessionStats,
};

/// Settings applied to every session the gateway runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewaySettings {
    pub session: SessionSettings,
    /// Upper bound on concurrently running sessions; unbounded when `None`
    pub max_concurrent_sessions: Option<usize>,
}

/// Capacity held by an admitted caller stream. Released on drop.
#[derive(Debug)]
pub struct SessionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Bridges caller streams to backend sessions.
///
/// The agent configuration is immutable and shared by every session; sessions
/// share nothing else.
pub struct SessionGateway {
    agent: Arc<AgentConfig>,
    backend_factory: BackendFactory,
    settings: GatewaySettings,
    slots: Option<Arc<Semaphore>>,
    active: Arc<AtomicUsize>,
}

impl SessionGateway {
    pub fn new(
        agent: Arc<AgentConfig>,
        backend_factory: BackendFactory,
        settings: GatewaySettings,
    ) -> Self {
        let slots = settings
            .max_concurrent_sessions
            .map(|max| Arc::new(Semaphore::new(max.min(Semaphore::MAX_PERMITS))));
        Self {
            agent,
            backend_factory,
            settings,
            slots,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn agent(&self) -> &Arc<AgentConfig> {
        &self.agent
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Number of sessions currently inside [`accept_connection`](Self::accept_connection).
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Reserves capacity for a new caller stream. Returns `None` when the
    /// concurrency cap is reached.
    pub fn try_admit(&self) -> Option<SessionPermit> {
        match &self.slots {
            None => Some(SessionPermit { _permit: None }),
            Some(slots) => slots.clone().try_acquire_owned().ok().map(|permit| SessionPermit {
                _permit: Some(permit),
            }),
        }
    }

    /// Runs one session for an accepted caller stream until it closes.
    ///
    /// The backend connection is attempted once within the connect timeout.
    /// On failure the caller is sent a close command carrying the diagnostic
    /// code and the session is discarded.
    pub async fn accept_connection(
        &self,
        inbound: mpsc::Receiver<InboundEvent>,
        caller_tx: mpsc::Sender<CallerCommand>,
    ) -> SessionReport {
        let session_id = Uuid::new_v4().to_string();
        let _active = ActiveGuard::enter(&self.active);
        info!(session_id = %session_id, agent = %self.agent.name, "Accepted caller stream");

        let backend = match (self.backend_factory)() {
            Ok(backend) => backend,
            Err(e) => {
                let err = SessionError::BackendConnect(e);
                error!(session_id = %session_id, error = %err, "Could not create backend");
                let _ = caller_tx
                    .send(CallerCommand::Close {
                        code: err.close_code(),
                        reason: err.code().to_string(),
                    })
                    .await;
                return SessionReport {
                    session_id,
                    final_state: SessionState::Closed,
                    close_reason: Some(CloseReason::Fatal(err)),
                    stats: SessionStats::default(),
                };
            }
        };

        let mut session = Session::new(
            session_id,
            self.agent.clone(),
            backend,
            caller_tx,
            self.settings.session,
        );

        match session.connect().await {
            Ok(backend_events) => session.run(inbound, backend_events).await,
            Err(err) => {
                session.close(CloseReason::Fatal(err)).await;
                session.report()
            }
        }
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::Relaxed);
        Self(active.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
