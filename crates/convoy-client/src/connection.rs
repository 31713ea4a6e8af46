use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use convoy_codec::{decode_frame_json, encode_frame_json, Frame};
use convoy_transport::SessionSink;
use tracing::{debug, info, warn};

/// Interpreter for inbound frames attached to a [`Connection`].
pub trait InboundHandler: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Processes one decoded frame. Runs on the delivery context and must
    /// finish, listener callbacks included, before the next frame.
    fn handle(&self, frame: Frame);
}

/// The one active handler and the phase it belongs to.
///
/// While `Authenticating`, entity traffic stays queued; installing an
/// `Active` handler is what releases it.
#[derive(Clone)]
pub enum HandlerPhase {
    Authenticating(Arc<dyn InboundHandler>),
    Active(Arc<dyn InboundHandler>),
}

impl HandlerPhase {
    pub fn handler(&self) -> &Arc<dyn InboundHandler> {
        match self {
            HandlerPhase::Authenticating(h) | HandlerPhase::Active(h) => h,
        }
    }

    pub fn is_authenticating(&self) -> bool {
        matches!(self, HandlerPhase::Authenticating(_))
    }
}

/// Point-in-time connection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames handed to a live session.
    pub sent: u64,
    /// Inbound text frames delivered, decodable or not.
    pub received: u64,
    /// Inbound frames dropped before reaching a handler.
    pub dropped: u64,
    /// Frames waiting in the outbound queue.
    pub queued: usize,
    pub session_live: bool,
    pub authenticating: bool,
}

#[derive(Default)]
struct ConnectionInner {
    session: Option<Box<dyn SessionSink>>,
    queue: VecDeque<Frame>,
    phase: Option<HandlerPhase>,
}

impl ConnectionInner {
    fn can_transmit(&self) -> bool {
        self.session.is_some() && matches!(self.phase, Some(HandlerPhase::Active(_)))
    }
}

/// Session holder, outbound FIFO and inbound dispatch point.
///
/// Queue, session and handler live behind one lock, so a handler swap is
/// atomic with respect to concurrent sends: a frame is either queued before
/// the swap and flushed by it, or sent after it.
#[derive(Default)]
pub struct Connection {
    inner: Mutex<ConnectionInner>,
    delivery: Mutex<()>,
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the active handler; an `Active` phase flushes the queue.
    pub fn set_handler(&self, phase: HandlerPhase) {
        let mut inner = self.lock();
        info!(
            "connection handler -> {} ({})",
            phase.handler().name(),
            if phase.is_authenticating() {
                "authenticating"
            } else {
                "active"
            }
        );
        inner.phase = Some(phase);
        self.flush(&mut inner);
    }

    /// Sends `frame` now when a session is live and the phase is active,
    /// otherwise appends it to the outbound queue.
    pub fn send(&self, frame: Frame) {
        let mut inner = self.lock();
        if inner.can_transmit() && inner.queue.is_empty() {
            if let Err(frame) = self.transmit(&mut inner, frame) {
                inner.queue.push_back(frame);
            }
        } else {
            debug!("queueing {:?} frame", frame.message);
            inner.queue.push_back(frame);
        }
    }

    /// Writes `frame` on the live session regardless of phase, skipping the
    /// queue. Used for the authentication frame that unblocks that queue.
    pub fn send_direct(&self, frame: Frame) -> bool {
        let mut inner = self.lock();
        if inner.session.is_none() {
            warn!("no live session for direct {:?} frame; dropped", frame.message);
            return false;
        }
        self.transmit(&mut inner, frame).is_ok()
    }

    /// Installs a freshly opened session and applies the flush rule.
    pub fn on_session_open(&self, session: Box<dyn SessionSink>) {
        let mut inner = self.lock();
        info!("session opened");
        inner.session = Some(session);
        self.flush(&mut inner);
    }

    /// Drops the session; later sends queue until the next open.
    pub fn on_session_closed(&self) {
        let mut inner = self.lock();
        if inner.session.take().is_some() {
            info!("session closed; outbound traffic is queued");
        }
    }

    /// Decodes one inbound text frame and hands it to the active handler.
    ///
    /// Deliveries are serialized: a frame's handler, listener callbacks
    /// included, completes before the next delivery starts.
    pub fn deliver(&self, text: &str) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        self.received.fetch_add(1, Ordering::Relaxed);

        let frame = match decode_frame_json(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("dropping undecodable frame: {err}");
                return;
            }
        };

        // Clone out so the handler runs without the connection lock held.
        let handler = self.lock().phase.as_ref().map(|p| Arc::clone(p.handler()));
        match handler {
            Some(handler) => handler.handle(frame),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("no handler attached; dropping {:?} frame", frame.message);
            }
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        let inner = self.lock();
        ConnectionStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queued: inner.queue.len(),
            session_live: inner.session.is_some(),
            authenticating: inner
                .phase
                .as_ref()
                .map(HandlerPhase::is_authenticating)
                .unwrap_or(true),
        }
    }

    fn flush(&self, inner: &mut ConnectionInner) {
        if !inner.can_transmit() || inner.queue.is_empty() {
            return;
        }
        debug!("flushing {} queued frames", inner.queue.len());
        while inner.can_transmit() {
            let Some(frame) = inner.queue.pop_front() else {
                break;
            };
            if let Err(frame) = self.transmit(inner, frame) {
                inner.queue.push_front(frame);
                break;
            }
        }
    }

    /// Writes one frame. On transport failure the session is discarded and
    /// the frame handed back so the caller can keep it queued in order.
    fn transmit(&self, inner: &mut ConnectionInner, frame: Frame) -> Result<(), Frame> {
        let text = match encode_frame_json(&frame) {
            Ok(text) => text,
            Err(err) => {
                warn!("dropping unencodable {:?} frame: {err}", frame.message);
                return Ok(());
            }
        };
        let Some(session) = inner.session.as_mut() else {
            return Err(frame);
        };
        match session.send_text(&text) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                warn!("session send failed, treating session as closed: {err}");
                inner.session = None;
                Err(frame)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use convoy_codec::{Frame, Verb};
    use convoy_core::EntityKind;
    use convoy_transport::InMemorySink;

    use super::{Connection, HandlerPhase, InboundHandler};

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Frame>>,
    }

    impl InboundHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handle(&self, frame: Frame) {
            self.frames.lock().expect("lock").push(frame);
        }
    }

    fn read(id: &str) -> Frame {
        Frame::new(Verb::Read)
            .with_model(EntityKind::Cluster)
            .with_id(id)
    }

    fn ids(sent: Vec<String>) -> Vec<String> {
        sent.into_iter()
            .map(|text| {
                let value: serde_json::Value = serde_json::from_str(&text).expect("json frame");
                value["id"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    #[test]
    fn queues_without_session_and_flushes_in_order_once_active() {
        let conn = Connection::new();
        let handler: Arc<dyn InboundHandler> = Arc::new(Recorder::default());
        conn.set_handler(HandlerPhase::Active(Arc::clone(&handler)));

        conn.send(read("/a"));
        conn.send(read("/b"));
        assert_eq!(conn.stats().queued, 2);

        let sink = InMemorySink::default();
        conn.on_session_open(Box::new(sink.clone()));
        conn.send(read("/c"));

        assert_eq!(ids(sink.take_sent()), vec!["/a", "/b", "/c"]);
        let stats = conn.stats();
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn authenticating_phase_holds_traffic_until_swap() {
        let conn = Connection::new();
        let auth: Arc<dyn InboundHandler> = Arc::new(Recorder::default());
        let router: Arc<dyn InboundHandler> = Arc::new(Recorder::default());
        conn.set_handler(HandlerPhase::Authenticating(auth));

        let sink = InMemorySink::default();
        conn.on_session_open(Box::new(sink.clone()));
        conn.send(read("/a"));
        assert_eq!(sink.sent_len(), 0);

        assert!(conn.send_direct(
            Frame::new(Verb::Authenticate).with_value(serde_json::json!({"email": "x@y"}))
        ));
        assert_eq!(sink.sent_len(), 1);

        conn.set_handler(HandlerPhase::Active(router));
        let sent = sink.take_sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains("Authenticate"));
        assert!(sent[1].contains("/a"));
    }

    #[test]
    fn send_failure_closes_session_and_requeues() {
        let conn = Connection::new();
        conn.set_handler(HandlerPhase::Active(Arc::new(Recorder::default())));
        let sink = InMemorySink::default();
        conn.on_session_open(Box::new(sink.clone()));

        sink.set_failed(true);
        conn.send(read("/a"));
        conn.send(read("/b"));
        let stats = conn.stats();
        assert!(!stats.session_live);
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.sent, 0);

        let fresh = InMemorySink::default();
        conn.on_session_open(Box::new(fresh.clone()));
        assert_eq!(ids(fresh.take_sent()), vec!["/a", "/b"]);
    }

    #[test]
    fn handler_swap_racing_concurrent_sends_loses_nothing() {
        const SENDERS: usize = 4;
        const PER_SENDER: usize = 250;

        let conn = Arc::new(Connection::new());
        conn.set_handler(HandlerPhase::Authenticating(Arc::new(Recorder::default())));
        let sink = InMemorySink::default();
        conn.on_session_open(Box::new(sink.clone()));

        let start = Arc::new(Barrier::new(SENDERS + 1));
        let senders: Vec<_> = (0..SENDERS)
            .map(|n| {
                let conn = Arc::clone(&conn);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for i in 0..PER_SENDER {
                        conn.send(read(&format!("/{n}/{i}")));
                    }
                })
            })
            .collect();

        start.wait();
        thread::yield_now();
        conn.set_handler(HandlerPhase::Active(Arc::new(Recorder::default())));
        for sender in senders {
            sender.join().expect("sender thread");
        }

        let sent = ids(sink.take_sent());
        assert_eq!(sent.len(), SENDERS * PER_SENDER);
        assert_eq!(conn.stats().queued, 0);
        for n in 0..SENDERS {
            let prefix = format!("/{n}/");
            let order: Vec<usize> = sent
                .iter()
                .filter_map(|id| id.strip_prefix(&prefix))
                .map(|i| i.parse().expect("numeric suffix"))
                .collect();
            assert_eq!(order, (0..PER_SENDER).collect::<Vec<_>>(), "sender {n}");
        }
    }

    #[test]
    fn direct_send_without_session_is_dropped() {
        let conn = Connection::new();
        assert!(!conn.send_direct(Frame::new(Verb::Authenticate)));
        assert_eq!(conn.stats().queued, 0);
    }

    #[test]
    fn deliver_counts_every_frame_and_routes_decodable_ones() {
        let conn = Connection::new();
        let recorder = Arc::new(Recorder::default());
        conn.set_handler(HandlerPhase::Active(recorder.clone()));

        conn.deliver(r#"{"message":"Updated","model":"Cluster","id":"/a"}"#);
        conn.deliver("not json");
        conn.deliver(r#"{"message":"Updated","id":"/a"}"#);

        let stats = conn.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.dropped, 1);
        assert_eq!(recorder.frames.lock().expect("lock").len(), 2);
    }
}
