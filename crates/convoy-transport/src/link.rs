use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::TransportError;

/// Coarse per-link transport health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHealthSnapshot {
    pub outbound_send_ok: u64,
    pub outbound_send_err: u64,
    pub inbound_received: u64,
    pub inbound_dropped: u64,
    pub sessions_opened: u64,
    pub reconnect_attempts: u64,
    pub last_error: Option<String>,
}

/// Outbound half of one live session.
pub trait SessionSink: Send {
    /// Attempts best-effort delivery of one text frame.
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;

    /// Whether the session is still believed to be open.
    fn is_open(&self) -> bool {
        true
    }
}

/// Lifecycle and traffic notifications produced by a [`Link`].
pub enum LinkEvent {
    /// A session was established; frames may be written through the sink.
    Opened(Box<dyn SessionSink>),
    /// One inbound text frame.
    Message(String),
    /// The current session ended.
    Closed { reason: Option<String> },
}

impl fmt::Debug for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::Opened(_) => f.write_str("Opened"),
            LinkEvent::Message(text) => f.debug_tuple("Message").field(text).finish(),
            LinkEvent::Closed { reason } => {
                f.debug_struct("Closed").field("reason", reason).finish()
            }
        }
    }
}

/// Session-oriented transport contract used by the sync engine.
///
/// The engine drains events with [`Link::poll_event`]; the thread doing so is
/// the delivery context for every inbound frame.
pub trait Link {
    /// Returns the next pending link event, if any.
    fn poll_event(&mut self) -> Option<LinkEvent>;

    /// Best-effort transport health counters.
    fn health_snapshot(&self) -> TransportHealthSnapshot {
        TransportHealthSnapshot::default()
    }
}

/// Shared-buffer sink for tests and simulations.
///
/// Clones observe the same sent buffer, so a test can keep one clone while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    sent: Arc<Mutex<Vec<String>>>,
    failed: Arc<AtomicBool>,
}

impl InMemorySink {
    /// Drains and returns every frame written so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of frames written and not yet taken.
    pub fn sent_len(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// If enabled, sends fail as if the socket had broken.
    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::SeqCst);
    }
}

impl SessionSink for InMemorySink {
    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct InMemoryLinkInner {
    events: VecDeque<LinkEvent>,
    inbound_received: u64,
    sessions_opened: u64,
}

/// In-memory link for tests and simulations.
///
/// Cloning yields another handle onto the same event queue.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLink {
    inner: Arc<Mutex<InMemoryLinkInner>>,
}

impl InMemoryLink {
    /// Queues a session-open event and returns a handle to its sink.
    pub fn open_session(&self) -> InMemorySink {
        let sink = InMemorySink::default();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sessions_opened += 1;
        inner
            .events
            .push_back(LinkEvent::Opened(Box::new(sink.clone())));
        sink
    }

    /// Queues one inbound text frame.
    pub fn enqueue_inbound(&self, text: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.inbound_received += 1;
        inner.events.push_back(LinkEvent::Message(text.into()));
    }

    /// Queues a session-closed event.
    pub fn close_session(&self, reason: Option<&str>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .push_back(LinkEvent::Closed {
                reason: reason.map(str::to_string),
            });
    }

    /// Events queued and not yet polled.
    pub fn pending_events(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .len()
    }
}

impl Link for InMemoryLink {
    fn poll_event(&mut self) -> Option<LinkEvent> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .pop_front()
    }

    fn health_snapshot(&self) -> TransportHealthSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        TransportHealthSnapshot {
            inbound_received: inner.inbound_received,
            sessions_opened: inner.sessions_opened,
            ..TransportHealthSnapshot::default()
        }
    }
}
