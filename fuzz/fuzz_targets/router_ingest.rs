#![no_main]

use std::sync::Arc;

use convoy_client::connection::HandlerPhase;
use convoy_client::entity::Entity;
use convoy_client::router::ModelRouter;
use convoy_client::state::SyncContext;
use convoy_core::{EntityKind, Path};
use convoy_transport::InMemorySink;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let ctx = SyncContext::new();
    if let Ok(root) = Path::new("/root", EntityKind::Cluster) {
        let _ = ctx
            .registry()
            .register(Entity::identified(root, Arc::downgrade(&ctx)));
    }
    ctx.connection
        .set_handler(HandlerPhase::Active(Arc::new(ModelRouter::new(Arc::downgrade(&ctx)))));
    ctx.connection.on_session_open(Box::new(InMemorySink::default()));

    for line in String::from_utf8_lossy(data).lines() {
        ctx.connection.deliver(line);
    }
});
