//! Live output fan-out.
//!
//! The [`OutputBroadcaster`] multiplexes line-level output from every
//! in-flight operation to interested observers. Each line carries its own
//! attribution (target path, operation kind, stream); observers must not
//! assume any ordering between lines with different tags.
//!
//! Every subscription owns an unbounded queue, so `publish` never blocks and
//! never drops a line for a live subscriber. Subscriptions only see lines
//! published after they were created; history lives in the session logs.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub use crate::process::OutputStream;

// =============================================================================
// Output Lines
// =============================================================================

/// The operation lane a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Install,
    Invoke,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Invoke => "invoke",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tagged line of operation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
    /// Target path of the session that ran the operation.
    pub target: PathBuf,
    pub kind: OperationKind,
    pub stream: OutputStream,
    pub text: String,
}

/// Restricts a subscription to one operation kind and/or stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputFilter {
    pub kind: Option<OperationKind>,
    pub stream: Option<OutputStream>,
}

impl OutputFilter {
    /// Accept every line.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: OperationKind) -> Self {
        Self {
            kind: Some(kind),
            stream: None,
        }
    }

    pub fn with_stream(mut self, stream: OutputStream) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn matches(&self, line: &OutputLine) -> bool {
        self.kind.map_or(true, |k| k == line.kind)
            && self.stream.map_or(true, |s| s == line.stream)
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

struct Subscriber {
    filter: OutputFilter,
    tx: mpsc::UnboundedSender<OutputLine>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

/// Fan-out hub for operation output. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct OutputBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for OutputBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl OutputBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every line.
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_filtered(OutputFilter::all())
    }

    /// Subscribes to lines accepted by `filter`.
    pub fn subscribe_filtered(&self, filter: OutputFilter) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, Subscriber { filter, tx });
        debug!(subscription = id, ?filter, "Output subscription added");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `line` to every matching subscriber. Returns the number of
    /// subscribers that received it.
    pub fn publish(&self, line: OutputLine) -> usize {
        let mut registry = self.registry.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in &registry.subscribers {
            if !subscriber.filter.matches(&line) {
                continue;
            }
            if subscriber.tx.send(line.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*id);
            }
        }

        for id in closed {
            registry.subscribers.remove(&id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A live output subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<OutputLine>,
    registry: Weak<Mutex<Registry>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next line. Returns `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<OutputLine> {
        self.rx.recv().await
    }

    /// Returns the next queued line without waiting.
    pub fn try_recv(&mut self) -> Option<OutputLine> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued line without waiting.
    pub fn drain(&mut self) -> Vec<OutputLine> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().subscribers.remove(&self.id);
            debug!(subscription = self.id, "Output subscription released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(target: &str, kind: OperationKind, stream: OutputStream, text: &str) -> OutputLine {
        OutputLine {
            target: PathBuf::from(target),
            kind,
            stream,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_fan_out_to_all_subscribers() {
        let broadcaster = OutputBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let delivered = broadcaster.publish(line(
            "/repo/a",
            OperationKind::Install,
            OutputStream::Out,
            "installing",
        ));

        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv().unwrap().text, "installing");
        assert_eq!(b.try_recv().unwrap().text, "installing");
    }

    #[test]
    fn test_late_subscriber_gets_no_history() {
        let broadcaster = OutputBroadcaster::new();
        broadcaster.publish(line("/repo/a", OperationKind::Invoke, OutputStream::Out, "early"));

        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_none());

        broadcaster.publish(line("/repo/a", OperationKind::Invoke, OutputStream::Out, "later"));
        assert_eq!(late.try_recv().unwrap().text, "later");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let broadcaster = OutputBroadcaster::new();
        let sub = broadcaster.subscribe();
        let _other = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[test]
    fn test_filter_by_kind_and_stream() {
        let broadcaster = OutputBroadcaster::new();
        let mut install_err = broadcaster.subscribe_filtered(
            OutputFilter::kind(OperationKind::Install).with_stream(OutputStream::Err),
        );

        broadcaster.publish(line("/r", OperationKind::Install, OutputStream::Out, "out"));
        broadcaster.publish(line("/r", OperationKind::Invoke, OutputStream::Err, "invoke err"));
        broadcaster.publish(line("/r", OperationKind::Install, OutputStream::Err, "install err"));

        let received = install_err.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].text, "install err");
    }

    #[tokio::test]
    async fn test_recv_ends_when_broadcaster_dropped() {
        let broadcaster = OutputBroadcaster::new();
        let mut sub = broadcaster.subscribe();
        drop(broadcaster);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_per_tag_order_with_concurrent_publishers() {
        let broadcaster = OutputBroadcaster::new();
        let mut sub = broadcaster.subscribe();

        let spawn_publisher = |target: &'static str, kind: OperationKind| {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    broadcaster.publish(line(target, kind, OutputStream::Out, &i.to_string()));
                    tokio::task::yield_now().await;
                }
            })
        };

        let first = spawn_publisher("/repo/a", OperationKind::Install);
        let second = spawn_publisher("/repo/b", OperationKind::Invoke);
        first.await.unwrap();
        second.await.unwrap();

        let received = sub.drain();
        assert_eq!(received.len(), 400);

        for (target, kind) in [
            ("/repo/a", OperationKind::Install),
            ("/repo/b", OperationKind::Invoke),
        ] {
            let texts: Vec<String> = received
                .iter()
                .filter(|l| l.target == PathBuf::from(target) && l.kind == kind)
                .map(|l| l.text.clone())
                .collect();
            let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
            assert_eq!(texts, expected);
        }
    }
}
