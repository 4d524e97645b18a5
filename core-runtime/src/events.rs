//! # Event Bus
//!
//! Typed lifecycle events for lyrics extraction jobs, published over
//! `tokio::sync::broadcast`. Hosts subscribe to drive UI refreshes or metrics
//! without polling the library item table.
//!
//! ```rust
//! use core_runtime::events::{EventBus, LyricsEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(LyricsEvent::JobStarted { item_id: 7 }).ok();
//! assert_eq!(rx.recv().await.unwrap(), LyricsEvent::JobStarted { item_id: 7 });
//! # }
//! ```
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that error.
//! Slow subscribers receive `RecvError::Lagged(n)` and continue from the
//! oldest retained event.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default per-subscriber buffer.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Lifecycle of a background lyrics extraction job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LyricsEvent {
    /// Job accepted; the item is now `queued`.
    JobQueued {
        item_id: i64,
        language: Option<String>,
    },
    /// A worker picked the job up; the item is now `processing`.
    JobStarted { item_id: i64 },
    /// Lyrics were stored on the item.
    JobCompleted { item_id: i64, source: String },
    /// The job ended without lyrics.
    JobFailed { item_id: i64, error: String },
}

impl LyricsEvent {
    pub fn item_id(&self) -> i64 {
        match self {
            LyricsEvent::JobQueued { item_id, .. }
            | LyricsEvent::JobStarted { item_id }
            | LyricsEvent::JobCompleted { item_id, .. }
            | LyricsEvent::JobFailed { item_id, .. } => *item_id,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            LyricsEvent::JobQueued { .. } => "Lyrics extraction queued",
            LyricsEvent::JobStarted { .. } => "Lyrics extraction started",
            LyricsEvent::JobCompleted { .. } => "Lyrics extraction completed",
            LyricsEvent::JobFailed { .. } => "Lyrics extraction failed",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            LyricsEvent::JobFailed { .. } => EventSeverity::Warning,
            LyricsEvent::JobCompleted { .. } => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Whether the job is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LyricsEvent::JobCompleted { .. } | LyricsEvent::JobFailed { .. }
        )
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Broadcast channel shared by publishers and subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LyricsEvent>,
}

impl EventBus {
    /// `capacity` is the number of events buffered per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: LyricsEvent) -> Result<usize, SendError<LyricsEvent>> {
        self.sender.send(event)
    }

    /// New receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<LyricsEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&LyricsEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let bus = EventBus::default();
/// let only_item_7 = EventStream::new(bus.subscribe()).filter(|e| e.item_id() == 7);
/// ```
pub struct EventStream {
    receiver: Receiver<LyricsEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<LyricsEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&LyricsEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Next event passing the filter.
    pub async fn recv(&mut self) -> Result<LyricsEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
