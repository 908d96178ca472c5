//! Watch categories, notification events, watchers and the watch registry.
//!
//! A watch is a one-shot subscription: it sits in the registry under its
//! category and path until a matching notification arrives, at which point
//! it is removed and delivered exactly once.

use crate::error::{KeeperError, KeeperResult};
use crate::session::KeeperState;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Category a watch is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchType {
    /// Armed by a data read
    Data,
    /// Armed by a children listing
    Children,
    /// Armed by an existence check
    Exists,
}

/// Event types carried by watch notifications
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEvent {
    /// Session state change, not tied to a node
    None = -1,
    /// A node was created
    NodeCreated = 1,
    /// A node was deleted
    NodeDeleted = 2,
    /// A node's data changed
    NodeDataChanged = 3,
    /// A node's child list changed
    NodeChildrenChanged = 4,
}

impl WatchEvent {
    /// Watch categories this event consumes.
    ///
    /// Data and exists watches are kept independent: a deletion fires data
    /// watches (and children watches) but never exists watches.
    pub fn watch_types(self) -> &'static [WatchType] {
        match self {
            WatchEvent::None => &[],
            WatchEvent::NodeCreated => &[WatchType::Data, WatchType::Exists],
            WatchEvent::NodeDeleted => &[WatchType::Data, WatchType::Children],
            WatchEvent::NodeDataChanged => &[WatchType::Data, WatchType::Exists],
            WatchEvent::NodeChildrenChanged => &[WatchType::Children],
        }
    }
}

impl TryFrom<i32> for WatchEvent {
    type Error = KeeperError;

    fn try_from(code: i32) -> KeeperResult<Self> {
        match code {
            -1 => Ok(WatchEvent::None),
            1 => Ok(WatchEvent::NodeCreated),
            2 => Ok(WatchEvent::NodeDeleted),
            3 => Ok(WatchEvent::NodeDataChanged),
            4 => Ok(WatchEvent::NodeChildrenChanged),
            _ => Err(KeeperError::Protocol(format!("unknown watch event type {code}"))),
        }
    }
}

/// A notification as handed to watchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    /// What happened
    pub event_type: WatchEvent,
    /// Keeper state at the time of the event
    pub state: KeeperState,
    /// Node path, empty for session state events
    pub path: String,
}

impl WatchedEvent {
    /// Session state change event
    pub fn session(state: KeeperState) -> Self {
        Self {
            event_type: WatchEvent::None,
            state,
            path: String::new(),
        }
    }
}

/// Object style watcher
pub trait WatchHandler: Send + Sync {
    /// Called once per delivered notification
    fn process_watch(&self, event: &WatchedEvent);
}

/// Something that can receive watch notifications
#[derive(Clone)]
pub enum Watcher {
    /// A plain closure
    Callback(Arc<dyn Fn(&WatchedEvent) + Send + Sync>),
    /// A handler object
    Handler(Arc<dyn WatchHandler>),
}

impl Watcher {
    /// Wrap a closure
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&WatchedEvent) + Send + Sync + 'static,
    {
        Watcher::Callback(Arc::new(f))
    }

    /// Wrap a handler object
    pub fn handler<H>(handler: Arc<H>) -> Self
    where
        H: WatchHandler + 'static,
    {
        Watcher::Handler(handler)
    }

    /// Deliver an event
    pub fn notify(&self, event: &WatchedEvent) {
        match self {
            Watcher::Callback(f) => f(event),
            Watcher::Handler(h) => h.process_watch(event),
        }
    }

    /// Identity comparison, two clones of one watcher are the same watcher
    pub fn same(&self, other: &Watcher) -> bool {
        self.identity() == other.identity()
    }

    fn identity(&self) -> *const () {
        match self {
            Watcher::Callback(f) => Arc::as_ptr(f) as *const (),
            Watcher::Handler(h) => Arc::as_ptr(h) as *const (),
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watcher::Callback(_) => write!(f, "Watcher::Callback({:p})", self.identity()),
            Watcher::Handler(_) => write!(f, "Watcher::Handler({:p})", self.identity()),
        }
    }
}

/// Watch argument given with a request
#[derive(Debug, Clone, Default)]
pub enum WatchArg {
    /// No watch
    #[default]
    None,
    /// Use the session's default watcher
    Default,
    /// Use this watcher
    Watcher(Watcher),
}

impl From<Watcher> for WatchArg {
    fn from(watcher: Watcher) -> Self {
        WatchArg::Watcher(watcher)
    }
}

impl From<bool> for WatchArg {
    fn from(watch: bool) -> Self {
        if watch {
            WatchArg::Default
        } else {
            WatchArg::None
        }
    }
}

/// Watch requested together with an operation
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Category to register under
    pub watch_type: WatchType,
    /// Node path
    pub path: String,
    /// Who to notify
    pub watcher: WatchArg,
}

impl WatchRequest {
    /// Create a new watch request
    pub fn new(watch_type: WatchType, path: impl Into<String>, watcher: impl Into<WatchArg>) -> Self {
        Self {
            watch_type,
            path: path.into(),
            watcher: watcher.into(),
        }
    }
}

/// Watches waiting for their notification, keyed by category then path
#[derive(Debug, Default)]
pub struct WatchRegistry {
    data: HashMap<String, Vec<Watcher>>,
    exists: HashMap<String, Vec<Watcher>>,
    children: HashMap<String, Vec<Watcher>>,
}

impl WatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, watch_type: WatchType) -> &HashMap<String, Vec<Watcher>> {
        match watch_type {
            WatchType::Data => &self.data,
            WatchType::Exists => &self.exists,
            WatchType::Children => &self.children,
        }
    }

    fn table_mut(&mut self, watch_type: WatchType) -> &mut HashMap<String, Vec<Watcher>> {
        match watch_type {
            WatchType::Data => &mut self.data,
            WatchType::Exists => &mut self.exists,
            WatchType::Children => &mut self.children,
        }
    }

    /// Add a watcher; registering the same watcher twice is a no-op
    pub fn register(&mut self, watch_type: WatchType, path: impl Into<String>, watcher: Watcher) {
        let watchers = self.table_mut(watch_type).entry(path.into()).or_default();
        if !watchers.iter().any(|w| w.same(&watcher)) {
            watchers.push(watcher);
        }
    }

    /// Remove and return every watcher an event on `path` consumes.
    ///
    /// A watcher registered under several consumed categories is returned once.
    pub fn take(&mut self, event: WatchEvent, path: &str) -> Vec<Watcher> {
        let mut fired: Vec<Watcher> = Vec::new();
        for watch_type in event.watch_types() {
            if let Some(watchers) = self.table_mut(*watch_type).remove(path) {
                for watcher in watchers {
                    if !fired.iter().any(|w| w.same(&watcher)) {
                        fired.push(watcher);
                    }
                }
            }
        }
        fired
    }

    /// Paths with at least one watcher of the given category, sorted
    pub fn paths(&self, watch_type: WatchType) -> Vec<String> {
        let mut paths: Vec<String> = self.table(watch_type).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        [&self.data, &self.exists, &self.children]
            .iter()
            .flat_map(|table| table.values())
            .map(Vec::len)
            .sum()
    }

    /// Whether no watch is registered
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.exists.is_empty() && self.children.is_empty()
    }

    /// Drop every registration
    pub fn clear(&mut self) {
        self.data.clear();
        self.exists.clear();
        self.children.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_watcher() -> (Watcher, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let watcher = Watcher::callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (watcher, count)
    }

    #[test]
    fn test_event_category_mapping() {
        assert_eq!(
            WatchEvent::NodeCreated.watch_types(),
            &[WatchType::Data, WatchType::Exists]
        );
        assert!(!WatchEvent::NodeDeleted
            .watch_types()
            .contains(&WatchType::Exists));
        assert!(WatchEvent::None.watch_types().is_empty());
        assert!(WatchEvent::try_from(9).is_err());
    }

    #[test]
    fn test_take_is_destructive() {
        let mut registry = WatchRegistry::new();
        let (watcher, _) = counting_watcher();
        registry.register(WatchType::Data, "/a", watcher);

        assert_eq!(registry.take(WatchEvent::NodeDataChanged, "/a").len(), 1);
        assert!(registry.take(WatchEvent::NodeDataChanged, "/a").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_watcher_deduplicated_across_categories() {
        let mut registry = WatchRegistry::new();
        let (watcher, count) = counting_watcher();
        registry.register(WatchType::Data, "/a", watcher.clone());
        registry.register(WatchType::Data, "/a", watcher.clone());
        registry.register(WatchType::Exists, "/a", watcher.clone());
        assert_eq!(registry.len(), 2);

        let fired = registry.take(WatchEvent::NodeCreated, "/a");
        assert_eq!(fired.len(), 1);

        let event = WatchedEvent {
            event_type: WatchEvent::NodeCreated,
            state: KeeperState::Connected,
            path: "/a".to_string(),
        };
        fired.iter().for_each(|w| w.notify(&event));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrelated_category_and_path_untouched() {
        let mut registry = WatchRegistry::new();
        let (a, _) = counting_watcher();
        let (b, _) = counting_watcher();
        registry.register(WatchType::Exists, "/a", a);
        registry.register(WatchType::Children, "/b", b);

        // Deletion does not consume exists watches
        assert!(registry.take(WatchEvent::NodeDeleted, "/a").is_empty());
        assert!(registry.take(WatchEvent::NodeChildrenChanged, "/a").is_empty());
        assert_eq!(registry.paths(WatchType::Exists), vec!["/a".to_string()]);
        assert_eq!(registry.paths(WatchType::Children), vec!["/b".to_string()]);
    }

    struct Recorder(parking_lot::Mutex<Vec<WatchedEvent>>);

    impl WatchHandler for Recorder {
        fn process_watch(&self, event: &WatchedEvent) {
            self.0.lock().push(event.clone());
        }
    }

    #[test]
    fn test_handler_watcher() {
        let recorder = Arc::new(Recorder(parking_lot::Mutex::new(Vec::new())));
        let watcher = Watcher::handler(recorder.clone());
        watcher.notify(&WatchedEvent::session(KeeperState::Expired));

        let events = recorder.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, WatchEvent::None);
        assert!(watcher.same(&watcher.clone()));
    }

    #[test]
    fn test_watch_arg_from_bool() {
        assert!(matches!(WatchArg::from(true), WatchArg::Default));
        assert!(matches!(WatchArg::from(false), WatchArg::None));
    }
}
