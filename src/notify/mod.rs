//! Change notifications for settings tree mutations
//!
//! Every committed value change and every node attachment is published as a
//! structured event. Delivery is fire-and-forget into the event-dispatch
//! collaborator: the tree's state is the source of truth, and a failed or
//! lagging delivery never rolls back the mutation that caused it.

pub mod hooks;

pub use hooks::HookChannel;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use crate::tree::{NodeKind, NodePath};

/// Structured notification emitted by the settings tree.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A parameter committed a new value. Sensitive parameters carry
    /// redacted renderings.
    ValueChanged {
        path: NodePath,
        old: String,
        new: String,
        at: DateTime<Utc>,
    },
    /// A node was attached to a container at runtime or assembly time.
    NodeAttached {
        path: NodePath,
        kind: NodeKind,
        at: DateTime<Utc>,
    },
}

impl ChangeEvent {
    pub fn path(&self) -> &NodePath {
        match self {
            ChangeEvent::ValueChanged { path, .. } => path,
            ChangeEvent::NodeAttached { path, .. } => path,
        }
    }
}

/// Narrow interface to the external event-dispatch collaborator.
///
/// Implementations must not block; delivery failures stay inside the sink.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: ChangeEvent);
}

/// In-process default sink fanning events out on a broadcast channel.
///
/// Subscribers that lag simply miss events; the sender side never fails the
/// mutation path.
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventBus {
    fn deliver(&self, event: ChangeEvent) {
        // A send only fails with zero subscribers, which is fine.
        let _ = self.tx.send(event);
    }
}

/// Publisher used by the settings tree.
pub struct ChangeNotifier {
    sink: std::sync::Arc<dyn EventSink>,
}

impl ChangeNotifier {
    pub fn new(sink: std::sync::Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    pub fn value_changed(&self, path: NodePath, old: String, new: String) {
        debug!(path = %path, "parameter value changed");
        self.sink.deliver(ChangeEvent::ValueChanged {
            path,
            old,
            new,
            at: Utc::now(),
        });
    }

    pub fn node_attached(&self, path: NodePath, kind: NodeKind) {
        debug!(path = %path, ?kind, "node attached");
        self.sink.deliver(ChangeEvent::NodeAttached {
            path,
            kind,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_fans_out_to_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.deliver(ChangeEvent::NodeAttached {
            path: NodePath::from(["autoresponse", "greeting"]),
            kind: NodeKind::Section,
            at: Utc::now(),
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(event.path().dotted(), "autoresponse.greeting");
    }

    #[test]
    fn delivery_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.deliver(ChangeEvent::ValueChanged {
            path: NodePath::from(["hub", "instance_name"]),
            old: "a".into(),
            new: "b".into(),
            at: Utc::now(),
        });
    }

    #[test]
    fn notifier_uses_the_sink() {
        let mut sink = MockEventSink::new();
        sink.expect_deliver()
            .withf(|event| matches!(event, ChangeEvent::ValueChanged { new, .. } if new == "42"))
            .times(1)
            .return_const(());
        let notifier = ChangeNotifier::new(std::sync::Arc::new(sink));
        notifier.value_changed(NodePath::from(["hub", "port"]), "0".into(), "42".into());
    }
}
