//! Listener bookkeeping shared by chat transports.

use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::event::{ChatEvent, ChatEventKind};

/// Callback invoked for every event of the subscribed kind.
pub type ChatHandler = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

/// Handle returned when registering a handler.
///
/// The handle is bound to the transport that issued it; removing it from any
/// other transport is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Listener {
    pub id: Uuid,
    pub kind: ChatEventKind,
    pub transport_id: Uuid,
}

/// Ordered set of handlers for one transport instance.
pub struct ListenerRegistry {
    transport_id: Uuid,
    entries: RwLock<Vec<(Listener, ChatHandler)>>,
}

impl ListenerRegistry {
    pub fn new(transport_id: Uuid) -> Self {
        Self {
            transport_id,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn transport_id(&self) -> Uuid {
        self.transport_id
    }

    /// Register `handler` for `kind`.
    pub fn add(&self, kind: ChatEventKind, handler: ChatHandler) -> Listener {
        let listener = Listener {
            id: Uuid::new_v4(),
            kind,
            transport_id: self.transport_id,
        };
        self.entries.write().push((listener.clone(), handler));
        listener
    }

    /// Remove a handler. Returns `false` if it was unknown or already removed.
    pub fn remove(&self, listener: &Listener) -> bool {
        if listener.transport_id != self.transport_id {
            return false;
        }
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(l, _)| l.id != listener.id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every handler registered for the event's kind, in registration order.
    pub fn dispatch(&self, event: &ChatEvent) {
        let kind = event.kind();
        // Clone the handlers so callbacks may add or remove listeners.
        let handlers: Vec<ChatHandler> = self
            .entries
            .read()
            .iter()
            .filter(|(l, _)| l.kind == kind)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("transport_id", &self.transport_id)
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_only_matching_kind() {
        let registry = ListenerRegistry::new(Uuid::new_v4());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        registry.add(
            ChatEventKind::Register,
            Arc::new(move |_: &ChatEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.dispatch(&ChatEvent::Connect);
        registry.dispatch(&ChatEvent::Register);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new(Uuid::new_v4());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            registry.add(ChatEventKind::Connect, Arc::new(move |_: &ChatEvent| order.lock().push(i)));
        }
        registry.dispatch(&ChatEvent::Connect);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_once() {
        let registry = ListenerRegistry::new(Uuid::new_v4());
        let listener = registry.add(ChatEventKind::Join, Arc::new(|_: &ChatEvent| {}));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&listener));
        assert!(!registry.remove(&listener));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_foreign_handle() {
        let a = ListenerRegistry::new(Uuid::new_v4());
        let b = ListenerRegistry::new(Uuid::new_v4());
        let listener = a.add(ChatEventKind::Join, Arc::new(|_: &ChatEvent| {}));
        assert!(!b.remove(&listener));
        assert_eq!(a.len(), 1);
    }
}
