use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use convoy_codec::{Frame, Verb};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::connection::{HandlerPhase, InboundHandler};
use crate::error::AuthFailure;
use crate::events::Listeners;
use crate::state::SyncContext;

/// Handshake outcome reported to application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Successful,
    Failed(AuthFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    AwaitingConnectionId,
    AwaitingServerVerdict,
    Authenticated,
    Failed,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Failed)
    }
}

/// HTTP side channel of the handshake.
pub trait AuthHttp: Send + Sync {
    /// POSTs an empty body to `url` with `query` appended and returns the
    /// response status. Only transport failures are errors.
    fn post(&self, url: &str, query: &[(&str, &str)]) -> Result<u16, AuthFailure>;
}

/// [`AuthHttp`] over a blocking `ureq` agent.
pub struct UreqAuthHttp {
    agent: ureq::Agent,
}

impl UreqAuthHttp {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .build();
        Self { agent }
    }
}

impl AuthHttp for UreqAuthHttp {
    fn post(&self, url: &str, query: &[(&str, &str)]) -> Result<u16, AuthFailure> {
        let request = query
            .iter()
            .fold(self.agent.post(url), |req, (key, value)| req.query(key, value));
        match request.call() {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(ureq::Error::Transport(err)) => Err(AuthFailure::Network(err.to_string())),
        }
    }
}

/// Extracts the `email` claim from the payload segment of a
/// `header.payload.signature` token without verifying it.
pub fn email_claim(token: &str) -> Result<String, AuthFailure> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(AuthFailure::MalformedCredential);
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AuthFailure::MalformedCredential)?;
    let claims: Value =
        serde_json::from_slice(&bytes).map_err(|_| AuthFailure::MalformedCredential)?;
    claims
        .get("email")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthFailure::MissingEmailClaim)
}

struct AuthShared {
    context: Weak<SyncContext>,
    config: SyncConfig,
    http: Arc<dyn AuthHttp>,
    state: Mutex<AuthState>,
    events: Arc<Listeners<AuthEvent>>,
    router: Arc<dyn InboundHandler>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuthShared {
    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `Failed` and reports it, at most once per handshake.
    fn fail(&self, failure: AuthFailure) {
        {
            let mut state = self.state();
            if state.is_terminal() {
                debug!("ignoring late handshake failure: {failure}");
                return;
            }
            *state = AuthState::Failed;
        }
        warn!("authentication failed: {failure}");
        self.events.notify(&AuthEvent::Failed(failure));
    }

    fn run_handshake(&self, connection_id: &str) {
        let outcome = self
            .http
            .post(
                &self.config.auth_endpoint,
                &self.config.handshake_query(connection_id),
            )
            .and_then(|status| match status {
                204 => email_claim(&self.config.user_credential),
                other => Err(AuthFailure::Rejected(other)),
            });
        let email = match outcome {
            Ok(email) => email,
            Err(failure) => return self.fail(failure),
        };
        let Some(ctx) = self.context.upgrade() else {
            return;
        };
        let frame = Frame::new(Verb::Authenticate).with_value(json!({ "email": email }));
        if ctx.connection.send_direct(frame) {
            debug!("Authenticate sent; awaiting server verdict");
        } else {
            self.fail(AuthFailure::Network(
                "session closed before Authenticate was sent".into(),
            ));
        }
    }
}

/// One-shot handshake handler installed in the `Authenticating` phase.
///
/// `ConnectionId` starts the HTTP exchange on a background thread so the
/// round-trip never blocks inbound delivery; `Authenticated` installs the
/// router as the active handler, which releases queued entity traffic.
#[derive(Clone)]
pub struct Authenticator {
    shared: Arc<AuthShared>,
}

impl Authenticator {
    pub fn new(
        context: Weak<SyncContext>,
        config: SyncConfig,
        http: Arc<dyn AuthHttp>,
        events: Arc<Listeners<AuthEvent>>,
        router: Arc<dyn InboundHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(AuthShared {
                context,
                config,
                http,
                state: Mutex::new(AuthState::AwaitingConnectionId),
                events,
                router,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> AuthState {
        *self.shared.state()
    }

    /// Blocks until the handshake thread, if any, has finished.
    pub fn join_worker(&self) {
        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("authentication worker panicked");
            }
        }
    }

    fn on_connection_id(&self, frame: &Frame) {
        let connection_id = frame
            .id
            .clone()
            .or_else(|| frame.value.as_str().map(str::to_string));
        let Some(connection_id) = connection_id else {
            return self.shared.fail(AuthFailure::MissingConnectionId);
        };
        {
            let mut state = self.shared.state();
            if *state != AuthState::AwaitingConnectionId {
                warn!("unexpected ConnectionId in {:?}; ignored", *state);
                return;
            }
            *state = AuthState::AwaitingServerVerdict;
        }
        info!("connection id {connection_id} received; starting handshake");

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("convoy-auth".into())
            .spawn(move || shared.run_handshake(&connection_id));
        match spawned {
            Ok(handle) => {
                *self
                    .shared
                    .worker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(err) => self.shared.fail(AuthFailure::Network(err.to_string())),
        }
    }

    fn on_authenticated(&self) {
        {
            let mut state = self.shared.state();
            if *state != AuthState::AwaitingServerVerdict {
                warn!("unexpected Authenticated in {:?}; ignored", *state);
                return;
            }
            *state = AuthState::Authenticated;
        }
        info!("authenticated");
        self.shared.events.notify(&AuthEvent::Successful);
        if let Some(ctx) = self.shared.context.upgrade() {
            ctx.connection
                .set_handler(HandlerPhase::Active(Arc::clone(&self.shared.router)));
        }
    }
}

impl InboundHandler for Authenticator {
    fn name(&self) -> &'static str {
        "authenticator"
    }

    fn handle(&self, frame: Frame) {
        match frame.message {
            Verb::ConnectionId => self.on_connection_id(&frame),
            Verb::Authenticated => self.on_authenticated(),
            Verb::Error => warn!(
                "server error during handshake: {}",
                frame
                    .value_str("message")
                    .or_else(|| frame.value.as_str())
                    .unwrap_or("unspecified")
            ),
            other => debug!("{other:?} before authentication; dropped"),
        }
    }
}
