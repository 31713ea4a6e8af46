use convoy_core::EntityKind;
use serde_json::{Map, Value};

use crate::route::Route;

/// One diffable attribute of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Changes are also reported to the parent cluster's listeners.
    pub aggregate: bool,
}

const fn field(name: &'static str, aggregate: bool) -> FieldSpec {
    FieldSpec { name, aggregate }
}

/// Per-kind hooks the generic entity engine calls into.
pub struct KindSchema {
    pub kind: EntityKind,
    pub fields: &'static [FieldSpec],
    /// Builds the `value` of a `Create` frame from draft attributes.
    pub create_value: fn(&'static [FieldSpec], &Map<String, Value>) -> Value,
    /// Parses a `Routed` payload; kinds without routes return `None`.
    pub route: fn(&Value) -> Option<Route>,
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl std::fmt::Debug for KindSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindSchema")
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Keeps only the schema's attributes, in schema order.
fn known_fields(fields: &'static [FieldSpec], draft: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    for f in fields {
        if let Some(value) = draft.get(f.name) {
            out.insert(f.name.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

/// Transports start offline unless the draft says otherwise.
fn transport_create_value(fields: &'static [FieldSpec], draft: &Map<String, Value>) -> Value {
    let mut value = known_fields(fields, draft);
    if let Value::Object(map) = &mut value {
        map.entry("online").or_insert(Value::Bool(false));
    }
    value
}

fn no_route(_: &Value) -> Option<Route> {
    None
}

pub static CLUSTER_SCHEMA: KindSchema = KindSchema {
    kind: EntityKind::Cluster,
    fields: &[field("name", false), field("description", false)],
    create_value: known_fields,
    route: no_route,
};

pub static TRANSPORT_SCHEMA: KindSchema = KindSchema {
    kind: EntityKind::Transport,
    fields: &[
        field("name", false),
        field("online", true),
        field("location", true),
        field("capacity", false),
    ],
    create_value: transport_create_value,
    route: Route::from_value,
};

pub static COMMODITY_SCHEMA: KindSchema = KindSchema {
    kind: EntityKind::Commodity,
    fields: &[
        field("name", false),
        field("status", true),
        field("pickup", false),
        field("dropoff", false),
    ],
    create_value: known_fields,
    route: no_route,
};

pub fn schema_for(kind: EntityKind) -> &'static KindSchema {
    match kind {
        EntityKind::Cluster => &CLUSTER_SCHEMA,
        EntityKind::Transport => &TRANSPORT_SCHEMA,
        EntityKind::Commodity => &COMMODITY_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use convoy_core::EntityKind;
    use serde_json::{json, Map, Value};

    use super::schema_for;

    fn draft(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn create_value_drops_unknown_attributes() {
        let schema = schema_for(EntityKind::Commodity);
        let value = (schema.create_value)(
            schema.fields,
            &draft(json!({"status": "waiting", "colour": "red"})),
        );
        assert_eq!(value, json!({"status": "waiting"}));
    }

    #[test]
    fn transport_create_value_defaults_offline() {
        let schema = schema_for(EntityKind::Transport);
        let value = (schema.create_value)(schema.fields, &draft(json!({"name": "van-1"})));
        assert_eq!(value, json!({"name": "van-1", "online": false}));
    }

    #[test]
    fn only_transports_parse_routes() {
        let payload = json!({"stops": []});
        assert!((schema_for(EntityKind::Transport).route)(&payload).is_some());
        assert!((schema_for(EntityKind::Commodity).route)(&payload).is_none());
        assert!(schema_for(EntityKind::Cluster).field("online").is_none());
        assert!(
            schema_for(EntityKind::Transport)
                .field("online")
                .expect("transport has online")
                .aggregate
        );
    }
}
