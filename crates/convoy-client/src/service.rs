use std::sync::Arc;
use std::time::{Duration, Instant};

use convoy_core::{EntityKind, Path};
use convoy_transport::{Link, LinkEvent, TransportHealthSnapshot};
use serde_json::{Map, Value};
use tracing::info;

use crate::auth::{AuthEvent, AuthHttp, AuthState, Authenticator, UreqAuthHttp};
use crate::capability::Model;
use crate::config::SyncConfig;
use crate::connection::{ConnectionStats, HandlerPhase, InboundHandler};
use crate::entity::Entity;
use crate::error::{RegistryError, SyncError};
use crate::events::{ListenerId, Listeners};
use crate::kinds::{Cluster, Commodity, Transport};
use crate::router::ModelRouter;
use crate::state::SyncContext;

const IDLE_PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Counters across the connection, registry and handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub connection: ConnectionStats,
    pub registered: usize,
    pub pending_creates: usize,
    pub auth: AuthState,
}

/// Owns one link, its connection context and the handshake, and hands out
/// typed entity handles.
///
/// The engine is driven by [`SyncClient::pump`]: each call drains the link's
/// pending events into the connection on the caller's thread.
pub struct SyncClient<L: Link> {
    link: L,
    context: Arc<SyncContext>,
    config: SyncConfig,
    http: Arc<dyn AuthHttp>,
    router: Arc<dyn InboundHandler>,
    auth_events: Arc<Listeners<AuthEvent>>,
    authenticator: Authenticator,
    sessions_opened: u64,
}

impl<L: Link> SyncClient<L> {
    /// Uses a blocking HTTP agent with `config.auth_timeout` for the handshake.
    pub fn new(link: L, config: SyncConfig) -> Self {
        let http = Arc::new(UreqAuthHttp::new(config.auth_timeout));
        Self::with_auth_http(link, config, http)
    }

    pub fn with_auth_http(link: L, config: SyncConfig, http: Arc<dyn AuthHttp>) -> Self {
        let context = SyncContext::new();
        let router: Arc<dyn InboundHandler> =
            Arc::new(ModelRouter::new(Arc::downgrade(&context)));
        let auth_events = Arc::new(Listeners::new());
        let authenticator = Authenticator::new(
            Arc::downgrade(&context),
            config.clone(),
            Arc::clone(&http),
            Arc::clone(&auth_events),
            Arc::clone(&router),
        );
        context
            .connection
            .set_handler(HandlerPhase::Authenticating(Arc::new(authenticator.clone())));
        Self {
            link,
            context,
            config,
            http,
            router,
            auth_events,
            authenticator,
            sessions_opened: 0,
        }
    }

    /// Drains every available link event and returns how many were handled.
    ///
    /// A session opened after the first one starts a fresh handshake before
    /// any queued traffic is released on it.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.link.poll_event() {
            handled += 1;
            match event {
                LinkEvent::Opened(sink) => {
                    if self.sessions_opened > 0 {
                        self.reauthenticate();
                    }
                    self.sessions_opened += 1;
                    self.context.connection.on_session_open(sink);
                }
                LinkEvent::Message(text) => self.context.connection.deliver(&text),
                LinkEvent::Closed { reason } => {
                    info!(
                        "link closed: {}",
                        reason.as_deref().unwrap_or("no reason given")
                    );
                    self.context.connection.on_session_closed();
                }
            }
        }
        handled
    }

    /// Pumps until `deadline` or until `done` holds, sleeping briefly when idle.
    /// Returns whether `done` held.
    pub fn run_until<F>(&mut self, deadline: Instant, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        loop {
            let handled = self.pump();
            if done(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            if handled == 0 {
                std::thread::sleep(IDLE_PUMP_INTERVAL);
            }
        }
    }

    /// Installs a fresh handshake as the active handler. Outbound entity
    /// traffic queues until it succeeds.
    pub fn reauthenticate(&mut self) {
        info!("starting a new authentication handshake");
        self.authenticator = Authenticator::new(
            Arc::downgrade(&self.context),
            self.config.clone(),
            Arc::clone(&self.http),
            Arc::clone(&self.auth_events),
            Arc::clone(&self.router),
        );
        self.context
            .connection
            .set_handler(HandlerPhase::Authenticating(Arc::new(
                self.authenticator.clone(),
            )));
    }

    pub fn auth_state(&self) -> AuthState {
        self.authenticator.state()
    }

    /// Blocks until the current handshake's HTTP step has finished.
    pub fn join_auth_worker(&self) {
        self.authenticator.join_worker();
    }

    pub fn add_auth_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.auth_events.add(callback)
    }

    pub fn remove_auth_listener(&self, id: ListenerId) -> bool {
        self.auth_events.remove(id)
    }

    /// Existing entity at `path`, or a newly registered identified handle.
    fn entity_at(&self, path: Path) -> Result<Arc<Entity>, SyncError> {
        let mut registry = self.context.registry();
        if let Some(existing) = registry.lookup(&path) {
            return Ok(existing);
        }
        let entity = Entity::identified(path, Arc::downgrade(&self.context));
        registry.register(Arc::clone(&entity))?;
        Ok(entity)
    }

    /// Handle to the cluster at `raw`, registering it locally on first use.
    pub fn cluster(&self, raw: &str) -> Result<Cluster, SyncError> {
        let path = Path::new(raw, EntityKind::Cluster)?;
        self.entity_at(path).map(Cluster::wrap)
    }

    pub fn transport(&self, raw: &str) -> Result<Transport, SyncError> {
        let path = Path::new(raw, EntityKind::Transport)?;
        self.entity_at(path).map(Transport::wrap)
    }

    pub fn commodity(&self, raw: &str) -> Result<Commodity, SyncError> {
        let path = Path::new(raw, EntityKind::Commodity)?;
        self.entity_at(path).map(Commodity::wrap)
    }

    fn pending_in(
        &self,
        cluster: &Cluster,
        kind: EntityKind,
        fields: Map<String, Value>,
    ) -> Result<Arc<Entity>, SyncError> {
        let parent = cluster.path().ok_or(RegistryError::UnknownPath)?;
        Ok(Entity::pending(
            kind,
            parent,
            fields,
            Arc::downgrade(&self.context),
        ))
    }

    /// Local transport draft under `cluster`. Nothing is sent until
    /// `create()` is called on it.
    pub fn new_transport(
        &self,
        cluster: &Cluster,
        fields: Map<String, Value>,
    ) -> Result<Transport, SyncError> {
        self.pending_in(cluster, EntityKind::Transport, fields)
            .map(Transport::wrap)
    }

    pub fn new_commodity(
        &self,
        cluster: &Cluster,
        fields: Map<String, Value>,
    ) -> Result<Commodity, SyncError> {
        self.pending_in(cluster, EntityKind::Commodity, fields)
            .map(Commodity::wrap)
    }

    pub fn stats(&self) -> SyncStats {
        let (registered, pending_creates) = {
            let registry = self.context.registry();
            (registry.len(), registry.pending_creates())
        };
        SyncStats {
            connection: self.context.connection.stats(),
            registered,
            pending_creates,
            auth: self.auth_state(),
        }
    }

    pub fn link_health(&self) -> TransportHealthSnapshot {
        self.link.health_snapshot()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use convoy_core::PathError;
    use convoy_transport::InMemoryLink;
    use serde_json::Map;

    use super::SyncClient;
    use crate::auth::{AuthHttp, AuthState};
    use crate::capability::Model;
    use crate::config::SyncConfig;
    use crate::error::{AuthFailure, SyncError};

    struct NoHttp;

    impl AuthHttp for NoHttp {
        fn post(&self, _url: &str, _query: &[(&str, &str)]) -> Result<u16, AuthFailure> {
            Err(AuthFailure::Network("offline".into()))
        }
    }

    fn client() -> SyncClient<InMemoryLink> {
        SyncClient::with_auth_http(
            InMemoryLink::default(),
            SyncConfig::new("app", "a.b.c"),
            Arc::new(NoHttp),
        )
    }

    #[test]
    fn accessors_reuse_registered_handles() {
        let client = client();
        let first = client.cluster("/root").expect("cluster handle");
        let second = client.cluster("root/").expect("same cluster");
        assert!(Arc::ptr_eq(first.entity(), second.entity()));
        assert_eq!(client.stats().registered, 1);
        assert_eq!(
            client.cluster("").err(),
            Some(SyncError::Path(PathError::InvalidPath(String::new())))
        );
    }

    #[test]
    fn drafts_are_not_registered_until_identified() {
        let client = client();
        let root = client.cluster("/root").expect("cluster handle");
        let draft = client
            .new_transport(&root, Map::new())
            .expect("draft under registered cluster");
        assert!(draft.path().is_none());
        let stats = client.stats();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.pending_creates, 0);
        assert_eq!(stats.auth, AuthState::AwaitingConnectionId);
        assert!(stats.connection.authenticating);
    }
}
