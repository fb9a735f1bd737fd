//! Realtime key-value store seam and presence helpers.
//!
//! The realtime store is a JSON tree addressed by slash-separated paths (`users/u1/online`).
//! Writing `null` removes a node. Each client session is a [`RealtimeConnection`]; writes
//! registered with [`RealtimeStore::on_disconnect`] run once when that session ends.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::{
    errors::StoreError,
    id::generate_connection_id,
    model::{fields, now_millis},
    store::Feed,
};

const FORBIDDEN_SEGMENT_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// A value to write, possibly resolved by the store at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Value(Value),
    /// Replaced by the store's clock (epoch millis) when the write is applied.
    ServerTimestamp,
}

impl RtValue {
    fn resolve(self) -> Value {
        match self {
            RtValue::Value(value) => value,
            RtValue::ServerTimestamp => Value::from(now_millis()),
        }
    }
}

impl From<Value> for RtValue {
    fn from(value: Value) -> Self {
        RtValue::Value(value)
    }
}

impl From<bool> for RtValue {
    fn from(value: bool) -> Self {
        RtValue::Value(Value::Bool(value))
    }
}

#[allow(async_fn_in_trait)]
pub trait RealtimeStore {
    /// Writes `value` at `path`, creating parents; `null` removes the node.
    async fn set(&self, path: &str, value: RtValue) -> Result<(), StoreError>;

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Live feed of the subtree at `path` (`None` while absent).
    async fn watch(&self, path: &str) -> Result<Feed<Option<Value>>, StoreError>;

    /// Registers a write the store performs when this session disconnects.
    ///
    /// A second registration for the same path replaces the first.
    async fn on_disconnect(&self, path: &str, value: RtValue) -> Result<(), StoreError>;

    /// Drops the disconnect writes registered at or below `path`.
    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError>;
}

/// Parent of every presence node.
pub const PRESENCE_ROOT: &str = "users";

/// Path of a user's presence node.
pub fn presence_path(uid: &str) -> String {
    format!("{PRESENCE_ROOT}/{uid}")
}

/// Marks `uid` online and arranges for the store to mark them offline when the session ends.
///
/// The disconnect writes are registered before going online so the node can never be left
/// online by a session that dropped in between.
pub async fn announce_presence<R: RealtimeStore + ?Sized>(realtime: &R, uid: &str) -> Result<(), StoreError> {
    let node = presence_path(uid);
    let online = format!("{node}/{}", fields::ONLINE);
    let last_online = format!("{node}/{}", fields::LAST_ONLINE);
    realtime.on_disconnect(&online, false.into()).await?;
    realtime.on_disconnect(&last_online, RtValue::ServerTimestamp).await?;
    realtime.set(&online, true.into()).await
}

fn split_path(path: &str) -> Result<Vec<String>, StoreError> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(bad) = segments.iter().find(|segment| segment.contains(FORBIDDEN_SEGMENT_CHARS)) {
        return Err(StoreError::invalid(format!("invalid realtime path segment '{bad}' in '{path}'")));
    }
    Ok(segments)
}

fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

/// In-process realtime store shared by every connection opened from it.
#[derive(Clone, Default)]
pub struct MemoryRealtime {
    inner: Arc<Mutex<RealtimeState>>,
}

#[derive(Default)]
struct RealtimeState {
    root: Value,
    watchers: Vec<Watcher>,
}

struct Watcher {
    path: Vec<String>,
    last: Option<Value>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

impl RealtimeState {
    fn read(&self, path: &[String]) -> Option<Value> {
        read_at(&self.root, path)
    }

    fn write(&mut self, path: &[String], value: Value) {
        if value.is_null() {
            remove_node(&mut self.root, path);
        } else {
            let mut node = &mut self.root;
            for segment in path {
                if !node.is_object() {
                    *node = Value::Object(Map::new());
                }
                let Some(children) = node.as_object_mut() else {
                    return;
                };
                node = children.entry(segment.clone()).or_insert(Value::Null);
            }
            *node = value;
        }
        self.notify();
    }

    fn notify(&mut self) {
        self.watchers.retain(|watcher| !watcher.tx.is_closed());
        let root = &self.root;
        for watcher in &mut self.watchers {
            let current = read_at(root, &watcher.path);
            if current != watcher.last {
                let _ = watcher.tx.send(current.clone());
                watcher.last = current;
            }
        }
    }
}

fn read_at(root: &Value, path: &[String]) -> Option<Value> {
    let mut node = root;
    for segment in path {
        node = node.as_object()?.get(segment)?;
    }
    (!node.is_null()).then(|| node.clone())
}

/// Removes the node at `path` and prunes parents left empty. Returns whether the parent is empty.
fn remove_node(node: &mut Value, path: &[String]) -> bool {
    let Some((first, rest)) = path.split_first() else {
        *node = Value::Null;
        return true;
    };
    let Value::Object(children) = node else {
        return false;
    };
    let now_empty = match children.get_mut(first) {
        Some(child) => remove_node(child, rest),
        None => false,
    };
    if now_empty {
        children.remove(first);
    }
    children.is_empty()
}

impl MemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RealtimeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a client session.
    pub fn connect(&self) -> RealtimeConnection {
        let connection = RealtimeConnection {
            database: self.clone(),
            id: generate_connection_id(),
            hooks: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        };
        log::debug!("realtime: connection {} opened", connection.id);
        connection
    }

    /// Reads a node without going through a session.
    pub fn snapshot(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        Ok(self.state().read(&segments))
    }

    pub fn live_feed_count(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|watcher| !watcher.tx.is_closed());
        state.watchers.len()
    }
}

/// One client session against a [`MemoryRealtime`].
///
/// Dropping the connection disconnects it.
pub struct RealtimeConnection {
    database: MemoryRealtime,
    id: String,
    hooks: Mutex<Vec<(Vec<String>, RtValue)>>,
    connected: AtomicBool,
}

impl RealtimeConnection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<(Vec<String>, RtValue)>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::invalid(format!("realtime connection {} is closed", self.id)))
        }
    }

    /// Ends the session, running its disconnect writes once. Returns how many ran.
    pub fn disconnect(&self) -> usize {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return 0;
        }
        let hooks = std::mem::take(&mut *self.hooks());
        let count = hooks.len();
        let mut state = self.database.state();
        for (path, value) in hooks {
            state.write(&path, value.resolve());
        }
        log::debug!("realtime: connection {} closed, ran {count} disconnect writes", self.id);
        count
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl RealtimeStore for RealtimeConnection {
    async fn set(&self, path: &str, value: RtValue) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let segments = split_path(path)?;
        if segments.is_empty() && !matches!(value, RtValue::Value(Value::Object(_)) | RtValue::Value(Value::Null)) {
            return Err(StoreError::invalid("the realtime root can only hold an object"));
        }
        self.database.state().write(&segments, value.resolve());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_connected()?;
        self.database.snapshot(path)
    }

    async fn watch(&self, path: &str) -> Result<Feed<Option<Value>>, StoreError> {
        self.ensure_connected()?;
        let segments = split_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.database.state();
        let current = state.read(&segments);
        let _ = tx.send(current.clone());
        state.watchers.push(Watcher {
            path: segments,
            last: current,
            tx,
        });
        Ok(Feed::from_receiver(rx))
    }

    async fn on_disconnect(&self, path: &str, value: RtValue) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let segments = split_path(path)?;
        let mut hooks = self.hooks();
        hooks.retain(|(existing, _)| *existing != segments);
        hooks.push((segments, value));
        Ok(())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let segments = split_path(path)?;
        self.hooks().retain(|(existing, _)| !is_prefix(&segments, existing));
        Ok(())
    }
}
