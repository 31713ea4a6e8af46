use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a transport does at one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAction {
    Pickup,
    Dropoff,
}

/// One step of a transport's route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    pub action: RouteAction,
    /// Path or id of the commodity handled at this stop.
    pub commodity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Value>,
}

/// Ordered pickup/dropoff plan assigned to a transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub stops: Vec<RouteStop>,
}

impl Route {
    /// Parses a `Routed` payload. Accepts either the route object itself or
    /// an object wrapping it under `route`.
    pub fn from_value(value: &Value) -> Option<Route> {
        let raw = value.get("route").unwrap_or(value);
        serde_json::from_value(raw.clone()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Route, RouteAction};

    #[test]
    fn parses_wrapped_and_bare_payloads() {
        let bare = json!({"stops": [
            {"action": "pickup", "commodity": "/root/5", "location": {"lat": 1.0, "lng": 2.0}},
            {"action": "dropoff", "commodity": "/root/5"}
        ]});
        let route = Route::from_value(&bare).expect("bare route should parse");
        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[0].action, RouteAction::Pickup);
        assert!(route.stops[1].location.is_none());

        let wrapped = json!({"route": bare});
        assert_eq!(Route::from_value(&wrapped), Some(route));
    }

    #[test]
    fn rejects_unknown_actions() {
        let bad = json!({"stops": [{"action": "teleport", "commodity": "x"}]});
        assert!(Route::from_value(&bad).is_none());
    }
}
