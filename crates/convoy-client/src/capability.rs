//! Role interfaces composed by the concrete kinds.
//!
//! Every kind is a [`Model`]; the remaining traits are opt-in and only
//! forward to the shared [`Entity`] record.

use std::sync::Arc;

use convoy_codec::Verb;
use convoy_core::{EntityKind, Path};
use serde_json::{Map, Value};

use crate::entity::{Entity, Lifecycle};
use crate::events::{EntityEvent, ListenerId};

pub trait Model {
    fn entity(&self) -> &Arc<Entity>;

    fn kind(&self) -> EntityKind {
        self.entity().kind()
    }

    fn path(&self) -> Option<Path> {
        self.entity().path()
    }

    fn is_connected(&self) -> bool {
        self.entity().is_connected()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.entity().lifecycle()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.entity().field(name)
    }

    fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EntityEvent) + Send + Sync + 'static,
        Self: Sized,
    {
        self.entity().add_listener(callback)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.entity().remove_listener(id)
    }
}

/// Reads current remote state; the reply arrives as a `Model` frame.
pub trait Readable: Model {
    fn connect(&self) {
        self.entity().send_op(Verb::Read, Value::Null);
    }
}

pub trait Creatable: Model {
    /// Requests creation. Warns and does nothing once connected.
    fn create(&self) {
        self.entity().create();
    }

    fn delete(&self) {
        self.entity().send_op(Verb::Delete, Value::Null);
    }

    /// Transmits only the attributes that differ from local state and
    /// returns their names.
    fn update(&self, partial: Map<String, Value>) -> Vec<String> {
        self.entity().update(partial)
    }
}

pub trait Subscribable: Model {
    fn subscribe(&self) {
        self.entity().send_op(Verb::Subscribe, Value::Null);
    }

    fn unsubscribe(&self) {
        self.entity().send_op(Verb::Unsubscribe, Value::Null);
    }
}

pub trait RouteSubscribable: Model {
    fn route_subscribe(&self) {
        self.entity().send_op(Verb::RouteSubscribe, Value::Null);
    }

    fn route_unsubscribe(&self) {
        self.entity().send_op(Verb::RouteUnsubscribe, Value::Null);
    }
}
