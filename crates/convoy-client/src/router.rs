use std::sync::{Arc, Weak};

use convoy_codec::{Frame, Verb};
use convoy_core::{EntityKind, Path};
use serde_json::Value;
use tracing::{debug, warn};

use crate::connection::InboundHandler;
use crate::entity::Entity;
use crate::events::EntityEvent;
use crate::state::SyncContext;

/// Post-authentication handler: demultiplexes inbound frames to registered
/// entities, resolves local creates and surfaces remotely created children.
pub struct ModelRouter {
    context: Weak<SyncContext>,
}

impl ModelRouter {
    pub fn new(context: Weak<SyncContext>) -> Self {
        Self { context }
    }

    /// Resolves a local pending create against a `Created` acknowledgement.
    ///
    /// Returns `false` when the ack does not belong to the oldest pending
    /// create; that entry is put back untouched.
    fn resolve_pending(&self, ctx: &Arc<SyncContext>, kind: EntityKind, frame: &Frame) -> bool {
        let pending = ctx.registry().take_oldest_pending_create();
        let Some(entity) = pending else {
            return false;
        };
        let same_cluster = match (&frame.cluster_id, entity.cluster()) {
            (Some(raw), Some(cluster)) => {
                Path::new(raw, EntityKind::Cluster).is_ok_and(|p| &p == cluster)
            }
            (None, _) => true,
            (Some(_), None) => false,
        };
        let target = resolve_target(frame, kind);
        let path = match target {
            Some(path) if entity.kind() == kind && same_cluster => path,
            _ => {
                debug!(
                    "Created {kind} does not match oldest pending {} create; restored",
                    entity.kind()
                );
                ctx.registry().restore_pending_create(entity);
                return false;
            }
        };

        if let Err(err) = entity.identify(path.clone()) {
            warn!("cannot assign {path} to pending {kind}: {err}; pending create restored");
            ctx.registry().restore_pending_create(entity);
            return false;
        }
        debug!("pending {kind} create identified as {path}");
        entity.notify_parent(EntityEvent::ChildAdded { kind, path });
        entity.notify_update(Verb::Created, frame);
        true
    }

    /// Registers an entity the client did not know about when its parent
    /// cluster is registered and the frame carries model state.
    fn discover(&self, ctx: &Arc<SyncContext>, verb: Verb, path: Path, frame: Frame) {
        let Value::Object(fields) = frame.value else {
            warn!("no entity at {path} for {verb:?} and no model state to build one; dropped");
            return;
        };
        if !verb.carries_model_state() {
            warn!("no entity at {path} for {verb:?}; dropped");
            return;
        }
        let Some(parent_path) = path.parent() else {
            warn!("no entity at {path} and no parent to own it; dropped");
            return;
        };

        let parent = {
            let mut registry = ctx.registry();
            let Some(parent) = registry.lookup(&parent_path) else {
                drop(registry);
                warn!("no entity at {path} and parent {parent_path} unknown; dropped");
                return;
            };
            let entity = Entity::synthesized(path.clone(), fields, Arc::downgrade(ctx));
            if let Err(err) = registry.register(entity) {
                drop(registry);
                warn!("cannot register discovered {path}: {err}");
                return;
            }
            parent
        };
        debug!("discovered remote {} at {path}", path.kind());
        parent.emit(EntityEvent::ChildAdded {
            kind: path.kind(),
            path,
        });
    }
}

impl InboundHandler for ModelRouter {
    fn name(&self) -> &'static str {
        "model-router"
    }

    fn handle(&self, frame: Frame) {
        let Some(ctx) = self.context.upgrade() else {
            return;
        };
        let verb = frame.message;
        let Some(kind) = frame.model else {
            warn!("{verb:?} frame without model; dropped");
            return;
        };
        if verb.is_outbound() || matches!(verb, Verb::ConnectionId | Verb::Authenticated) {
            debug!("{verb:?} is not a model notification; dropped");
            return;
        }

        if verb == Verb::Created
            && kind != EntityKind::Cluster
            && self.resolve_pending(&ctx, kind, &frame)
        {
            return;
        }

        let Some(path) = resolve_target(&frame, kind) else {
            warn!("cannot resolve target of {verb:?} {kind}; dropped");
            return;
        };
        let entity = ctx.registry().lookup(&path);
        match entity {
            Some(entity) => {
                debug!("{verb:?} -> {path}");
                entity.notify_update(verb, &frame);
                if verb == Verb::Deleted {
                    ctx.registry().unregister(&path);
                    entity.notify_parent(EntityEvent::ChildRemoved {
                        kind: path.kind(),
                        path,
                    });
                }
            }
            None => self.discover(&ctx, verb, path, frame),
        }
    }
}

/// Identifier carried in `value.id`, string or numeric.
fn value_id(frame: &Frame) -> Option<String> {
    match frame.value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Verbs a per-kind feed reports against the cluster that owns the feed.
fn addresses_cluster_feed(verb: Verb) -> bool {
    matches!(verb, Verb::Subscribed | Verb::Unsubscribed | Verb::Error)
}

/// Inbound path resolution, first match wins:
///
/// 1. `id` holding an absolute path;
/// 2. `clusterId` joined with a relative `id`, else with `value.id`;
/// 3. cluster kind only: `value.id` holding an absolute path;
/// 4. `clusterId` alone addresses that cluster, for per-kind feed
///    acknowledgements and errors only.
pub fn resolve_target(frame: &Frame, kind: EntityKind) -> Option<Path> {
    if let Some(id) = frame.id.as_deref().filter(|id| id.starts_with('/')) {
        return Path::new(id, kind).ok();
    }
    if let Some(raw) = frame.cluster_id.as_deref() {
        let cluster = Path::new(raw, EntityKind::Cluster).ok()?;
        return match frame.id.clone().or_else(|| value_id(frame)) {
            Some(relative) => cluster.child(&relative, kind).ok(),
            None if addresses_cluster_feed(frame.message) => Some(cluster),
            None => None,
        };
    }
    if kind == EntityKind::Cluster {
        return value_id(frame)
            .filter(|id| id.starts_with('/'))
            .and_then(|id| Path::new(&id, kind).ok());
    }
    None
}
