use std::{
    collections::BTreeMap,
    future::Future,
    ops::Bound,
    pin::Pin,
    sync::Mutex,
    task::{Context, Poll},
};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::UnboundedReceiverStream};
use tracing::debug;

use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait RealtimeStore: Send + Sync {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>>;

    /// Resolves once the write is confirmed. Writing `null` removes the node.
    fn set<'a>(&'a self, path: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Yields the current value at `path` on attach, then on every change.
    fn observe<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Subscription, StoreError>>;
}

#[derive(Debug)]
pub struct Subscription {
    path: String,
    events: UnboundedReceiverStream<Option<Value>>,
}

impl Subscription {
    pub fn new(path: impl Into<String>, events: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self {
            path: path.into(),
            events: UnboundedReceiverStream::new(events),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Stream for Subscription {
    type Item = Option<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

#[derive(Debug)]
struct Observer {
    last: Option<Value>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

#[derive(Debug)]
struct Tree {
    root: Value,
    // Keyed by path segments, so every path under a prefix is one range.
    observers: BTreeMap<Vec<String>, Vec<Observer>>,
}

#[derive(Debug)]
pub struct MemoryStore {
    tree: Mutex<Tree>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Tree {
                root: Value::Object(Map::new()),
                observers: BTreeMap::new(),
            }),
        }
    }

    fn get_now(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let tree = self.tree.lock().map_err(|_| StoreError::Poisoned)?;

        Ok(lookup(&tree.root, &segments(path)).cloned())
    }

    fn set_now(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut tree = self.tree.lock().map_err(|_| StoreError::Poisoned)?;
        let written = segments(path);

        write(&mut tree.root, &written, value);
        if !tree.root.is_object() {
            tree.root = Value::Object(Map::new());
        }

        let Tree { root, observers } = &mut *tree;
        for key in affected_keys(observers, &written) {
            let Some(entry) = observers.get_mut(&key) else {
                continue;
            };
            let current = lookup(&*root, &key).cloned();

            entry.retain_mut(|observer| {
                if current == observer.last {
                    return !observer.tx.is_closed();
                }

                observer.last = current.clone();
                observer.tx.send(current.clone()).is_ok()
            });
            if entry.is_empty() {
                observers.remove(&key);
            }
        }

        Ok(())
    }

    fn observe_now(&self, path: &str) -> Result<Subscription, StoreError> {
        let mut tree = self.tree.lock().map_err(|_| StoreError::Poisoned)?;
        let observed = segments(path);
        let current = lookup(&tree.root, &observed).cloned();

        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so the attach-time event cannot fail.
        let _ = tx.send(current.clone());

        let entry = tree.observers.entry(observed).or_default();
        entry.retain(|observer| !observer.tx.is_closed());
        entry.push(Observer { last: current, tx });
        debug!(path, observers = entry.len(), "observer attached");

        Ok(Subscription::new(path, rx))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeStore for MemoryStore {
    fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        Box::pin(async move { self.get_now(path) })
    }

    fn set<'a>(&'a self, path: &'a str, value: Value) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.set_now(path, value) })
    }

    fn observe<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Subscription, StoreError>> {
        Box::pin(async move { self.observe_now(path) })
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Observed paths a write at `written` can change: its ancestors, itself and
/// everything below it.
fn affected_keys<V>(index: &BTreeMap<Vec<String>, V>, written: &[String]) -> Vec<Vec<String>> {
    let ancestors = (0..written.len())
        .map(|n| &written[..n])
        .filter(|prefix| index.contains_key(*prefix))
        .map(<[String]>::to_vec);

    let below = index
        .range::<[String], _>((Bound::Included(written), Bound::Unbounded))
        .map(|(key, _)| key)
        .take_while(|key| key.starts_with(written))
        .cloned();

    ancestors.chain(below).collect()
}

fn lookup<'a>(node: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter()
        .try_fold(node, |node, segment| node.as_object()?.get(segment))
}

fn write(node: &mut Value, path: &[String], value: Value) {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    let Value::Object(map) = node else {
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.remove(head);
        } else {
            map.insert(head.clone(), value);
        }
        return;
    }

    if value.is_null() && !map.contains_key(head) {
        return;
    }

    let child = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    write(child, rest, value);

    if child.as_object().is_some_and(Map::is_empty) {
        map.remove(head);
    }
}
