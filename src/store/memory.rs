//! In-memory store for tests
//!
//! Mimics the store's MULTI/EXEC/DISCARD semantics, logs every command it
//! receives and can be told to reject specific commands.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::connection::StoreConnection;
use super::error::StoreError;
use super::provider::ConnectionProvider;
use crate::config::Endpoint;
use crate::reconciler::ReconcileError;

#[derive(Default)]
struct MemoryState {
    data: BTreeMap<String, String>,
    received: Vec<String>,
    failures: HashSet<String>,
    acquired: usize,
    released: usize,
    unavailable: bool,
}

/// Shared store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

fn op_name(verb: &str, key: &str) -> String {
    if key.is_empty() {
        verb.to_string()
    } else {
        format!("{} {}", verb, key)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.state.lock().data.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().data.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Reject `verb key` (or a bare `verb` when `key` is empty)
    pub fn fail_on(&self, verb: &str, key: &str) {
        self.state.lock().failures.insert(op_name(verb, key));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Refuse new connections
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Every command received, e.g. `SET a 1`, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Received SET/DEL commands only
    pub fn mutations(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|c| c.starts_with("SET ") || c.starts_with("DEL "))
            .collect()
    }

    pub fn clear_log(&self) {
        self.state.lock().received.clear();
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    pub fn released(&self) -> usize {
        self.state.lock().released
    }

    pub fn connect(&self) -> MemoryConnection {
        self.state.lock().acquired += 1;
        MemoryConnection {
            store: self.clone(),
            queue: None,
            released: false,
        }
    }

    /// Log the command and apply failure injection
    fn receive(&self, verb: &'static str, key: &str, line: String) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.received.push(line);
        if state.failures.contains(&op_name(verb, key)) {
            return Err(StoreError::Command {
                verb,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

enum Queued {
    Set(String, String),
    Del(String),
}

pub struct MemoryConnection {
    store: MemoryStore,
    queue: Option<Vec<Queued>>,
    released: bool,
}

impl MemoryConnection {
    fn apply(&self, op: Queued) {
        let mut state = self.store.state.lock();
        match op {
            Queued::Set(key, value) => {
                state.data.insert(key, value);
            }
            Queued::Del(key) => {
                state.data.remove(&key);
            }
        }
    }

    fn submit(&mut self, op: Queued) {
        match self.queue.as_mut() {
            Some(queue) => queue.push(op),
            None => self.apply(op),
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store
            .receive("SET", key, format!("SET {} {}", key, value))?;
        self.submit(Queued::Set(key.into(), value.into()));
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.receive("GET", key, format!("GET {}", key))?;
        Ok(self.store.value(key))
    }

    async fn del(&mut self, key: &str) -> Result<(), StoreError> {
        self.store.receive("DEL", key, format!("DEL {}", key))?;
        self.submit(Queued::Del(key.into()));
        Ok(())
    }

    async fn multi(&mut self) -> Result<(), StoreError> {
        self.store.receive("MULTI", "", "MULTI".into())?;
        if self.queue.is_some() {
            return Err(StoreError::Command {
                verb: "MULTI",
                message: "MULTI calls can not be nested".into(),
            });
        }
        self.queue = Some(Vec::new());
        Ok(())
    }

    async fn exec(&mut self) -> Result<(), StoreError> {
        let queue = self.queue.take();
        self.store.receive("EXEC", "", "EXEC".into())?;
        let Some(queue) = queue else {
            return Err(StoreError::Command {
                verb: "EXEC",
                message: "EXEC without MULTI".into(),
            });
        };
        for op in queue {
            self.apply(op);
        }
        Ok(())
    }

    async fn discard(&mut self) -> Result<(), StoreError> {
        self.queue = None;
        self.store.receive("DISCARD", "", "DISCARD".into())
    }

    async fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.store.state.lock().released += 1;
        }
    }
}

#[async_trait]
impl ConnectionProvider for MemoryStore {
    async fn acquire(
        &self,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn StoreConnection>, ReconcileError> {
        if self.state.lock().unavailable {
            return Err(ReconcileError::Connection {
                addr: format!("{}:{}", endpoint.hostname, endpoint.port),
                source: StoreError::Connection("connection refused".into()),
            });
        }
        Ok(Box::new(self.connect()))
    }
}
