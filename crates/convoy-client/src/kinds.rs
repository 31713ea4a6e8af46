use std::sync::Arc;

use convoy_core::EntityKind;
use serde_json::Value;

use crate::capability::{Creatable, Model, Readable, RouteSubscribable, Subscribable};
use crate::entity::Entity;

macro_rules! kind_handle {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            entity: Arc<Entity>,
        }

        impl $name {
            pub const KIND: EntityKind = $kind;

            /// Wraps `entity` when it has this handle's kind.
            pub fn from_entity(entity: Arc<Entity>) -> Option<Self> {
                (entity.kind() == Self::KIND).then_some(Self { entity })
            }

            pub(crate) fn wrap(entity: Arc<Entity>) -> Self {
                debug_assert_eq!(entity.kind(), Self::KIND);
                Self { entity }
            }

            pub fn name(&self) -> Option<String> {
                string_field(&self.entity, "name")
            }
        }

        impl Model for $name {
            fn entity(&self) -> &Arc<Entity> {
                &self.entity
            }
        }

        impl Readable for $name {}
        impl Creatable for $name {}
        impl Subscribable for $name {}
    };
}

kind_handle!(
    /// Grouping entity that owns subclusters, transports and commodities.
    Cluster,
    EntityKind::Cluster
);
kind_handle!(
    /// Mobile agent that carries commodities along a route.
    Transport,
    EntityKind::Transport
);
kind_handle!(
    /// Transportable request with pickup and dropoff locations.
    Commodity,
    EntityKind::Commodity
);

impl RouteSubscribable for Transport {}

fn string_field(entity: &Entity, name: &str) -> Option<String> {
    entity
        .field(name)
        .and_then(|v| v.as_str().map(str::to_string))
}

impl Cluster {
    pub fn description(&self) -> Option<String> {
        string_field(&self.entity, "description")
    }

    /// Registered transports directly under this cluster.
    pub fn transports(&self) -> Vec<Transport> {
        self.entity
            .children(Some(EntityKind::Transport))
            .into_iter()
            .filter_map(Transport::from_entity)
            .collect()
    }

    pub fn commodities(&self) -> Vec<Commodity> {
        self.entity
            .children(Some(EntityKind::Commodity))
            .into_iter()
            .filter_map(Commodity::from_entity)
            .collect()
    }

    pub fn subclusters(&self) -> Vec<Cluster> {
        self.entity
            .children(Some(EntityKind::Cluster))
            .into_iter()
            .filter_map(Cluster::from_entity)
            .collect()
    }
}

impl Transport {
    /// `false` until the server reports otherwise.
    pub fn online(&self) -> bool {
        self.entity
            .field("online")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn location(&self) -> Option<Value> {
        self.entity.field("location")
    }

    pub fn capacity(&self) -> Option<u64> {
        self.entity.field("capacity").and_then(|v| v.as_u64())
    }
}

impl Commodity {
    pub fn status(&self) -> Option<String> {
        string_field(&self.entity, "status")
    }

    pub fn pickup(&self) -> Option<Value> {
        self.entity.field("pickup")
    }

    pub fn dropoff(&self) -> Option<Value> {
        self.entity.field("dropoff")
    }
}
