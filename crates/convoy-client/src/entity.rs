use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use convoy_codec::{Frame, Verb};
use convoy_core::{EntityKind, Path};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::events::{EntityEvent, ListenerId, Listeners};
use crate::schema::{schema_for, KindSchema};
use crate::state::SyncContext;

/// Where an entity is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No server-assigned path yet; outbound operations are backlogged.
    Unknown,
    /// Path assigned and registered, no server acknowledgement yet.
    Identified,
    /// At least one server acknowledgement received.
    Connected,
    /// Terminal.
    Deleted,
}

/// Operation recorded while the entity has no path.
#[derive(Debug, Clone)]
struct PendingOp {
    verb: Verb,
    value: Value,
}

#[derive(Debug, Default)]
struct EntityState {
    path: Option<Path>,
    connected: bool,
    deleted: bool,
    create_sent: bool,
    fields: Map<String, Value>,
    draft: Map<String, Value>,
    backlog: VecDeque<PendingOp>,
}

/// Core record shared by every entity kind: identity, lifecycle flags,
/// attribute state, listeners and the pre-identity backlog.
///
/// Lock order: registry before entity state, entity state before connection.
/// The entity state lock is never held while the registry is locked from here.
pub struct Entity {
    kind: EntityKind,
    schema: &'static KindSchema,
    cluster: Option<Path>,
    state: Mutex<EntityState>,
    listeners: Listeners<EntityEvent>,
    context: Weak<SyncContext>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind)
            .field("path", &self.path())
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

impl Entity {
    fn with_state(
        kind: EntityKind,
        cluster: Option<Path>,
        state: EntityState,
        context: Weak<SyncContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            schema: schema_for(kind),
            cluster,
            state: Mutex::new(state),
            listeners: Listeners::new(),
            context,
        })
    }

    /// An entity whose path is already known (clusters, or handles to
    /// existing remote entities).
    pub fn identified(path: Path, context: Weak<SyncContext>) -> Arc<Self> {
        let kind = path.kind();
        let cluster = path.parent();
        Self::with_state(
            kind,
            cluster,
            EntityState {
                path: Some(path),
                ..EntityState::default()
            },
            context,
        )
    }

    /// A locally initiated entity under `cluster` waiting for the server to
    /// assign its identity.
    pub fn pending(
        kind: EntityKind,
        cluster: Path,
        draft: Map<String, Value>,
        context: Weak<SyncContext>,
    ) -> Arc<Self> {
        Self::with_state(
            kind,
            Some(cluster),
            EntityState {
                draft,
                ..EntityState::default()
            },
            context,
        )
    }

    /// A remotely initiated entity discovered through an inbound frame.
    pub fn synthesized(
        path: Path,
        fields: Map<String, Value>,
        context: Weak<SyncContext>,
    ) -> Arc<Self> {
        let kind = path.kind();
        let cluster = path.parent();
        let schema = schema_for(kind);
        let fields = fields
            .into_iter()
            .filter(|(name, _)| schema.field(name).is_some())
            .collect();
        Self::with_state(
            kind,
            cluster,
            EntityState {
                path: Some(path),
                connected: true,
                fields,
                ..EntityState::default()
            },
            context,
        )
    }

    fn lock(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn schema(&self) -> &'static KindSchema {
        self.schema
    }

    /// Assigned path, `None` while the server has not confirmed identity.
    pub fn path(&self) -> Option<Path> {
        self.lock().path.clone()
    }

    /// Owning cluster, known even before identity is assigned.
    pub fn cluster(&self) -> Option<&Path> {
        self.cluster.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn is_deleted(&self) -> bool {
        self.lock().deleted
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let state = self.lock();
        if state.deleted {
            Lifecycle::Deleted
        } else if state.connected {
            Lifecycle::Connected
        } else if state.path.is_some() {
            Lifecycle::Identified
        } else {
            Lifecycle::Unknown
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.lock().fields.get(name).cloned()
    }

    pub fn fields(&self) -> Map<String, Value> {
        self.lock().fields.clone()
    }

    /// Operations waiting for identity.
    pub fn backlog_len(&self) -> usize {
        self.lock().backlog.len()
    }

    pub fn context(&self) -> Option<Arc<SyncContext>> {
        self.context.upgrade()
    }

    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EntityEvent) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn emit(&self, event: EntityEvent) {
        self.listeners.notify(&event);
    }

    /// Re-fires `event` on the owning cluster's listeners, if that cluster
    /// is registered.
    pub fn notify_parent(&self, event: EntityEvent) {
        let (Some(ctx), Some(cluster)) = (self.context(), self.cluster.as_ref()) else {
            return;
        };
        let parent = ctx.registry().lookup(cluster);
        if let Some(parent) = parent {
            parent.emit(event);
        }
    }

    /// Registered children of this entity's path.
    pub fn children(&self, kind: Option<EntityKind>) -> Vec<Arc<Entity>> {
        let (Some(ctx), Some(path)) = (self.context(), self.path()) else {
            return Vec::new();
        };
        let children = ctx.registry().children_of(&path, kind);
        children
    }

    /// Frames for `verb` addressed to `path`. Cluster subscriptions fan out
    /// into one feed per child kind because the server multiplexes them
    /// separately.
    fn frames_for(&self, verb: Verb, value: Value, path: &Path) -> Vec<Frame> {
        if self.kind == EntityKind::Cluster && matches!(verb, Verb::Subscribe | Verb::Unsubscribe)
        {
            return [EntityKind::Transport, EntityKind::Commodity]
                .into_iter()
                .map(|child| {
                    Frame::new(verb)
                        .with_model(child)
                        .with_cluster_id(path.to_string())
                })
                .collect();
        }
        let frame = match (self.kind, path.parent()) {
            (EntityKind::Cluster, _) | (_, None) => Frame::new(verb)
                .with_model(self.kind)
                .with_id(path.to_string()),
            (_, Some(parent)) => Frame::new(verb)
                .with_model(self.kind)
                .with_cluster_id(parent.to_string())
                .with_id(path.name()),
        };
        vec![frame.with_value(value)]
    }

    /// Sends `verb` to the server, or backlogs it until identity is known.
    pub fn send_op(&self, verb: Verb, value: Value) {
        let Some(ctx) = self.context() else {
            warn!("{} entity detached from its connection; {verb:?} dropped", self.kind);
            return;
        };
        let mut state = self.lock();
        if state.deleted {
            warn!("{verb:?} on deleted {} entity ignored", self.kind);
            return;
        }
        match state.path.clone() {
            Some(path) => {
                for frame in self.frames_for(verb, value, &path) {
                    ctx.connection.send(frame);
                }
            }
            None => {
                debug!("backlogging {verb:?} until {} identity is assigned", self.kind);
                state.backlog.push_back(PendingOp { verb, value });
            }
        }
    }

    /// Asks the server to create this entity. Only valid while unconnected.
    pub fn create(self: &Arc<Self>) {
        let Some(ctx) = self.context() else {
            warn!("{} entity detached from its connection; create dropped", self.kind);
            return;
        };
        let awaiting_identity;
        let frame = {
            let mut state = self.lock();
            if state.connected || state.deleted {
                warn!(
                    "create() on {} {} that is already connected or deleted; ignored",
                    self.kind,
                    display_path(state.path.as_ref())
                );
                return;
            }
            if state.create_sent {
                warn!("create() already pending for {} entity; ignored", self.kind);
                return;
            }
            state.create_sent = true;
            awaiting_identity = state.path.is_none();
            let value = (self.schema.create_value)(self.schema.fields, &state.draft);
            let frame = Frame::new(Verb::Create)
                .with_model(self.kind)
                .with_value(value);
            match (&state.path, &self.cluster) {
                (Some(path), _) if self.kind == EntityKind::Cluster => {
                    frame.with_id(path.to_string())
                }
                (Some(path), Some(cluster)) => frame
                    .with_cluster_id(cluster.to_string())
                    .with_id(path.name()),
                (Some(path), None) => frame.with_id(path.to_string()),
                (None, Some(cluster)) => frame.with_cluster_id(cluster.to_string()),
                (None, None) => frame,
            }
        };
        if awaiting_identity {
            ctx.registry().add_pending_create(Arc::clone(self));
        }
        ctx.connection.send(frame);
    }

    /// Sends only the attributes in `partial` that differ from local state.
    /// Returns the names actually transmitted.
    pub fn update(&self, partial: Map<String, Value>) -> Vec<String> {
        let changed: Map<String, Value> = {
            let state = self.lock();
            partial
                .into_iter()
                .filter(|(name, value)| {
                    if self.schema.field(name).is_none() {
                        warn!("{} has no attribute {name:?}; not sent", self.kind);
                        return false;
                    }
                    state.fields.get(name) != Some(value)
                })
                .collect()
        };
        if changed.is_empty() {
            debug!("update on {} carries no changes; nothing sent", self.kind);
            return Vec::new();
        }
        let names = changed.keys().cloned().collect();
        self.send_op(Verb::Update, Value::Object(changed));
        names
    }

    /// Assigns the server-confirmed path, registers the entity and flushes its
    /// backlog to the connection in original order, addressed to `path`.
    pub fn identify(self: &Arc<Self>, path: Path) -> Result<(), RegistryError> {
        let Some(ctx) = self.context() else {
            return Err(RegistryError::UnknownPath);
        };
        let mut registry = ctx.registry();
        if registry.contains(&path) {
            return Err(RegistryError::PathCollision(path.to_string()));
        }
        {
            let mut state = self.lock();
            if let Some(existing) = &state.path {
                return Err(RegistryError::PathCollision(existing.to_string()));
            }
            state.path = Some(path.clone());
            let backlog: Vec<PendingOp> = state.backlog.drain(..).collect();
            if !backlog.is_empty() {
                debug!("flushing {} backlogged ops to {path}", backlog.len());
            }
            for op in backlog {
                for frame in self.frames_for(op.verb, op.value, &path) {
                    ctx.connection.send(frame);
                }
            }
        }
        registry.register(Arc::clone(self))
    }

    /// Applies one inbound frame addressed to this entity.
    pub fn notify_update(&self, reason: Verb, frame: &Frame) {
        if self.is_deleted() {
            debug!("{reason:?} for deleted {} entity ignored", self.kind);
            return;
        }
        match reason {
            Verb::Model => {
                self.mark_connected();
                self.emit(EntityEvent::Connected);
                self.update_fields(&frame.value);
            }
            Verb::Created => {
                self.mark_connected();
                self.emit(EntityEvent::Created);
                self.update_fields(&frame.value);
            }
            Verb::Updated => {
                self.mark_connected();
                // The diff's single Updated event doubles as this reason's
                // callback, so nothing extra fires here.
                self.update_fields(&frame.value);
            }
            Verb::Deleted => {
                {
                    let mut state = self.lock();
                    state.deleted = true;
                    state.connected = false;
                    state.backlog.clear();
                }
                self.emit(EntityEvent::Deleted);
            }
            Verb::Subscribed => self.emit(EntityEvent::Subscribed),
            Verb::Unsubscribed => self.emit(EntityEvent::Unsubscribed),
            Verb::RouteSubscribed => self.emit(EntityEvent::RouteSubscribed),
            Verb::RouteUnsubscribed => self.emit(EntityEvent::RouteUnsubscribed),
            Verb::Routed => match (self.schema.route)(&frame.value) {
                Some(route) => self.emit(EntityEvent::Routed(route)),
                None => warn!("{} cannot interpret Routed payload; dropped", self.kind),
            },
            Verb::Error => {
                let message = frame
                    .value_str("message")
                    .or_else(|| frame.value.as_str())
                    .unwrap_or("unspecified server error")
                    .to_string();
                self.emit(EntityEvent::Error(message));
            }
            other => warn!("{other:?} is not an entity notification; dropped"),
        }
    }

    fn mark_connected(&self) {
        let mut state = self.lock();
        if !state.deleted {
            state.connected = true;
        }
    }

    /// Diffs every known attribute present in `value` against local state.
    ///
    /// Each change fires `FieldChanged`; any change fires exactly one
    /// `Updated`. Parent-visible changes are re-fired on the owning cluster as
    /// `ChildUpdated`. Attributes absent from `value` are left untouched.
    /// Returns the changed attribute names.
    pub fn update_fields(&self, value: &Value) -> Vec<String> {
        let Value::Object(incoming) = value else {
            return Vec::new();
        };
        let (path, changed) = {
            let mut state = self.lock();
            if state.deleted {
                return Vec::new();
            }
            let mut changed = Vec::new();
            for field in self.schema.fields {
                let Some(new) = incoming.get(field.name) else {
                    continue;
                };
                if state.fields.get(field.name) == Some(new) {
                    continue;
                }
                state.fields.insert(field.name.to_string(), new.clone());
                changed.push((field, new.clone()));
            }
            (state.path.clone(), changed)
        };
        if changed.is_empty() {
            return Vec::new();
        }

        for (field, value) in &changed {
            self.emit(EntityEvent::FieldChanged {
                field: field.name.to_string(),
                value: value.clone(),
            });
        }
        let names: Vec<String> = changed.iter().map(|(s, _)| s.name.to_string()).collect();
        self.emit(EntityEvent::Updated(names.clone()));

        let aggregate: Vec<String> = changed
            .iter()
            .filter(|(s, _)| s.aggregate)
            .map(|(s, _)| s.name.to_string())
            .collect();
        if let (false, Some(path)) = (aggregate.is_empty(), path) {
            self.notify_parent(EntityEvent::ChildUpdated {
                kind: self.kind,
                path,
                fields: aggregate,
            });
        }
        names
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(Path::to_string)
        .unwrap_or_else(|| "<unassigned>".to_string())
}
