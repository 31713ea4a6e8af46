//! WebSocket transport link for convoy.
//!
//! This crate provides a `Link` implementation backed by a single outbound
//! WebSocket connection with reconnect/backoff. Every successful connect is
//! surfaced as a fresh session so the engine can re-run its session-open rules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use convoy_transport::{Link, LinkEvent, SessionSink, TransportError, TransportHealthSnapshot};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WebSocketLinkConfig {
    pub url: String,
    pub reconnect: bool,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub outbound_queue_capacity: usize,
    pub inbound_queue_capacity: usize,
}

impl WebSocketLinkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(10),
            outbound_queue_capacity: 1024,
            inbound_queue_capacity: 4096,
        }
    }
}

#[derive(Debug, Error)]
pub enum WebSocketLinkError {
    #[error("failed to start websocket worker: {0}")]
    Worker(String),
}

pub struct WebSocketLink {
    inbound_rx: mpsc::Receiver<LinkEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    metrics: Arc<WebSocketLinkMetricsInner>,
}

#[derive(Debug, Default)]
struct WebSocketLinkMetricsInner {
    outbound_send_ok: AtomicU64,
    outbound_send_err: AtomicU64,
    inbound_received: AtomicU64,
    inbound_dropped: AtomicU64,
    sessions_opened: AtomicU64,
    reconnect_attempts: AtomicU64,
}

/// Sink half handed to the engine for one connected session.
struct WebSocketSink {
    outbound_tx: tokio_mpsc::Sender<String>,
    open: Arc<AtomicBool>,
}

impl SessionSink for WebSocketSink {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        self.outbound_tx
            .try_send(text.to_string())
            .map_err(|err| match err {
                tokio_mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
                tokio_mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

impl WebSocketLink {
    pub fn connect(config: WebSocketLinkConfig) -> Result<Self, WebSocketLinkError> {
        let (inbound_tx, inbound_rx) =
            mpsc::sync_channel::<LinkEvent>(config.inbound_queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let metrics = Arc::new(WebSocketLinkMetricsInner::default());

        let worker_metrics = Arc::clone(&metrics);
        let worker = thread::Builder::new()
            .name("convoy-websocket".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        warn!("websocket worker could not build runtime: {err}");
                        return;
                    }
                };
                runtime.block_on(run_websocket_worker(
                    config,
                    worker_metrics,
                    inbound_tx,
                    shutdown_rx,
                ));
            })
            .map_err(|err| WebSocketLinkError::Worker(err.to_string()))?;

        Ok(Self {
            inbound_rx,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
            metrics,
        })
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Unblock a worker parked on a full inbound channel; it sees the
        // shutdown before reading again.
        while self.inbound_rx.try_recv().is_ok() {}
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Link for WebSocketLink {
    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inbound_rx.try_recv().ok()
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        let m = &self.metrics;
        TransportHealthSnapshot {
            outbound_send_ok: m.outbound_send_ok.load(Ordering::Relaxed),
            outbound_send_err: m.outbound_send_err.load(Ordering::Relaxed),
            inbound_received: m.inbound_received.load(Ordering::Relaxed),
            inbound_dropped: m.inbound_dropped.load(Ordering::Relaxed),
            sessions_opened: m.sessions_opened.load(Ordering::Relaxed),
            reconnect_attempts: m.reconnect_attempts.load(Ordering::Relaxed),
            last_error: None,
        }
    }
}

async fn run_websocket_worker(
    config: WebSocketLinkConfig,
    metrics: Arc<WebSocketLinkMetricsInner>,
    inbound_tx: mpsc::SyncSender<LinkEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut backoff = config.reconnect_initial;

    'outer: loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break 'outer,
            connect_result = connect_async(&config.url) => {
                metrics.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                match connect_result {
                    Ok((stream, _)) => {
                        info!("websocket connected to {}", config.url);
                        backoff = config.reconnect_initial;
                        let (mut write, mut read) = stream.split();
                        let (outbound_tx, mut outbound_rx) =
                            tokio_mpsc::channel::<String>(config.outbound_queue_capacity);
                        let open = Arc::new(AtomicBool::new(true));

                        // Lifecycle events must not be lost; block until the engine drains.
                        let sink = WebSocketSink { outbound_tx, open: Arc::clone(&open) };
                        if inbound_tx.send(LinkEvent::Opened(Box::new(sink))).is_err() {
                            break 'outer;
                        }
                        metrics.sessions_opened.fetch_add(1, Ordering::Relaxed);

                        let reason = loop {
                            // Shutdown first so a drained channel cannot refill during drop.
                            tokio::select! {
                                biased;
                                _ = &mut shutdown_rx => {
                                    open.store(false, Ordering::Relaxed);
                                    let _ = write.send(Message::Close(None)).await;
                                    break 'outer;
                                }
                                maybe_out = outbound_rx.recv() => {
                                    let Some(text) = maybe_out else {
                                        break None;
                                    };
                                    if let Err(err) = write.send(Message::Text(text)).await {
                                        metrics.outbound_send_err.fetch_add(1, Ordering::Relaxed);
                                        break Some(err.to_string());
                                    }
                                    metrics.outbound_send_ok.fetch_add(1, Ordering::Relaxed);
                                }
                                maybe_in = read.next() => {
                                    let text = match maybe_in {
                                        Some(Ok(Message::Text(text))) => text,
                                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                            Ok(text) => text,
                                            Err(_) => {
                                                metrics.inbound_dropped.fetch_add(1, Ordering::Relaxed);
                                                continue;
                                            }
                                        },
                                        Some(Ok(Message::Close(frame))) => {
                                            break frame.map(|f| f.reason.to_string());
                                        }
                                        Some(Ok(_)) => continue,
                                        Some(Err(err)) => break Some(err.to_string()),
                                        None => break None,
                                    };
                                    // Blocks the socket while the engine is behind; frames are
                                    // never dropped.
                                    if inbound_tx.send(LinkEvent::Message(text)).is_err() {
                                        break 'outer;
                                    }
                                    metrics.inbound_received.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        };

                        open.store(false, Ordering::Relaxed);
                        info!("websocket session closed: {}", reason.as_deref().unwrap_or("eof"));
                        if inbound_tx.send(LinkEvent::Closed { reason }).is_err() {
                            break 'outer;
                        }
                    }
                    Err(err) => {
                        debug!("websocket connect to {} failed: {err}", config.url);
                    }
                }

                if !config.reconnect {
                    break 'outer;
                }

                tokio::select! {
                    _ = &mut shutdown_rx => break 'outer,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = std::cmp::min(backoff.saturating_mul(2), config.reconnect_max);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use convoy_transport::{Link, LinkEvent};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::Message};

    use super::{WebSocketLink, WebSocketLinkConfig};

    async fn next_event(link: &mut WebSocketLink) -> LinkEvent {
        for _ in 0..200 {
            if let Some(event) = link.poll_event() {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no link event within deadline");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn link_opens_session_and_exchanges_text_frames() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback bind should work");
        let addr = listener.local_addr().expect("addr should resolve");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept should work");
            let mut ws = accept_async(stream).await.expect("handshake should work");
            ws.send(Message::Text(r#"{"message":"ConnectionId","id":"c-1"}"#.into()))
                .await
                .expect("server write should work");
            let echoed = ws.next().await.expect("client frame").expect("valid frame");
            assert_eq!(echoed, Message::Text("hello".into()));
        });

        let mut config = WebSocketLinkConfig::new(format!("ws://{addr}"));
        config.reconnect = false;
        let mut link = WebSocketLink::connect(config).expect("link should start");

        let mut sink = match next_event(&mut link).await {
            LinkEvent::Opened(sink) => sink,
            other => panic!("expected open, got {other:?}"),
        };
        match next_event(&mut link).await {
            LinkEvent::Message(text) => assert!(text.contains("c-1")),
            other => panic!("expected message, got {other:?}"),
        }
        sink.send_text("hello").expect("send should queue");

        server.await.expect("server task should finish");
        assert!(matches!(next_event(&mut link).await, LinkEvent::Closed { .. }));
        assert!(!sink.is_open());
        assert_eq!(link.health_snapshot().sessions_opened, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_inbound_queue_applies_backpressure_without_loss() {
        const FRAMES: usize = 40;
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("loopback bind should work");
        let addr = listener.local_addr().expect("addr should resolve");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept should work");
            let mut ws = accept_async(stream).await.expect("handshake should work");
            for i in 0..FRAMES {
                ws.send(Message::Text(format!("frame-{i}")))
                    .await
                    .expect("server write should work");
            }
            ws.close(None).await.expect("server close should work");
        });

        let mut config = WebSocketLinkConfig::new(format!("ws://{addr}"));
        config.reconnect = false;
        config.inbound_queue_capacity = 4;
        let mut link = WebSocketLink::connect(config).expect("link should start");

        // Let the server outrun the engine so the inbound queue fills.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(matches!(next_event(&mut link).await, LinkEvent::Opened(_)));
        for i in 0..FRAMES {
            match next_event(&mut link).await {
                LinkEvent::Message(text) => assert_eq!(text, format!("frame-{i}")),
                other => panic!("expected frame-{i}, got {other:?}"),
            }
        }
        assert!(matches!(next_event(&mut link).await, LinkEvent::Closed { .. }));
        server.await.expect("server task should finish");

        let health = link.health_snapshot();
        assert_eq!(health.inbound_received, FRAMES as u64);
        assert_eq!(health.inbound_dropped, 0);
    }
}
