use std::sync::Arc;

use convoy_client::connection::HandlerPhase;
use convoy_client::entity::Entity;
use convoy_client::router::ModelRouter;
use convoy_client::state::SyncContext;
use convoy_core::{EntityKind, Path};
use convoy_transport::InMemorySink;

fn xorshift64(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

const VERBS: &[&str] = &[
    "Model", "Created", "Updated", "Deleted", "Subscribed", "Routed", "Error", "Read", "Bogus",
];
const MODELS: &[&str] = &["Cluster", "Transport", "Commodity", "Truck"];
const IDS: &[&str] = &["/root", "/root/7", "5", "", "/", "a/b", "/root/north"];

fn pick<'a>(s: &mut u64, items: &[&'a str]) -> &'a str {
    items[(xorshift64(s) % items.len() as u64) as usize]
}

fn random_frame(seed: u64) -> String {
    let mut s = seed.max(1);
    let mut fields = vec![format!(r#""message":"{}""#, pick(&mut s, VERBS))];
    if xorshift64(&mut s) % 4 != 0 {
        fields.push(format!(r#""model":"{}""#, pick(&mut s, MODELS)));
    }
    if xorshift64(&mut s) % 2 == 0 {
        fields.push(format!(r#""id":"{}""#, pick(&mut s, IDS)));
    }
    if xorshift64(&mut s) % 2 == 0 {
        fields.push(format!(r#""clusterId":"{}""#, pick(&mut s, IDS)));
    }
    match xorshift64(&mut s) % 4 {
        0 => fields.push(r#""value":{"status":"waiting","online":true,"id":"9"}"#.into()),
        1 => fields.push(r#""value":"oops""#.into()),
        2 => fields.push(r#""value":{"stops":[{"action":"pickup","commodity":"5"}]}"#.into()),
        _ => {}
    }
    format!("{{{}}}", fields.join(","))
}

#[test]
fn fuzz_like_router_ingest_does_not_panic() {
    let ctx = SyncContext::new();
    let root = Path::new("/root", EntityKind::Cluster).expect("valid path");
    ctx.registry()
        .register(Entity::identified(root, Arc::downgrade(&ctx)))
        .expect("root registers");
    ctx.connection.set_handler(HandlerPhase::Active(Arc::new(ModelRouter::new(
        Arc::downgrade(&ctx),
    ))));
    let sink = InMemorySink::default();
    ctx.connection.on_session_open(Box::new(sink.clone()));

    for i in 0..1500_u64 {
        ctx.connection.deliver(&random_frame(0xC0DEC0DE ^ i));
        if i % 100 == 0 {
            ctx.connection.deliver("{not json");
        }
    }

    let stats = ctx.connection.stats();
    assert_eq!(stats.received, 1515);
    assert!(stats.dropped >= 15);
    assert_eq!(sink.sent_len(), 0, "inbound traffic never produces outbound frames");
}
