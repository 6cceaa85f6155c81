//! Per-worker socket table (spec §3 "Socket entry").

use crate::transport::Transport;
use indexmap::IndexMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Connected,
}

/// Builds the socket-table key `"<host>:<port>[:<tag>]"` (spec §3).
pub fn socket_key(host: &str, port: u16, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{host}:{port}:{tag}"),
        None => format!("{host}:{port}"),
    }
}

pub struct SocketEntry {
    pub key: String,
    transport: Option<Box<dyn Transport>>,
    pub is_tls: bool,
    pub state: SocketState,
    pub timeout: Duration,
    peek: Vec<u8>,
}

impl SocketEntry {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            transport: None,
            is_tls: false,
            state: SocketState::Closed,
            timeout,
            peek: Vec::new(),
        }
    }

    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.is_tls = transport.is_tls();
        self.transport = Some(transport);
        self.state = SocketState::Connected;
        let _ = self.transport.as_mut().unwrap().set_timeout(Some(self.timeout));
    }

    /// Invariant (spec §3): a `Connected` entry always has a live handle.
    pub fn transport_mut(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        if self.state != SocketState::Connected {
            return None;
        }
        self.transport.as_deref_mut()
    }

    pub fn close(&mut self) {
        if let Some(mut t) = self.transport.take() {
            let _ = t.shutdown();
        }
        self.state = SocketState::Closed;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if let Some(t) = self.transport.as_mut() {
            let _ = t.set_timeout(Some(timeout));
        }
    }

    pub fn peek_buf(&self) -> &[u8] {
        &self.peek
    }

    pub fn set_peek_buf(&mut self, data: Vec<u8>) {
        self.peek = data;
    }
}

/// Keyed by `"<host>:<port>[:<tag>]"`, plus the worker's current-socket
/// pointer set by `_REQ`/`_RES` (spec §3 "Worker").
#[derive(Default)]
pub struct SocketTable {
    entries: IndexMap<String, SocketEntry>,
    current: Option<String>,
}

impl SocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, key: &str, default_timeout: Duration) -> &mut SocketEntry {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| SocketEntry::new(key, default_timeout))
    }

    pub fn get(&self, key: &str) -> Option<&SocketEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut SocketEntry> {
        self.entries.get_mut(key)
    }

    pub fn set_current(&mut self, key: impl Into<String>) {
        self.current = Some(key.into());
    }

    pub fn current_key(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_mut(&mut self) -> Option<&mut SocketEntry> {
        let key = self.current.clone()?;
        self.entries.get_mut(&key)
    }

    pub fn close_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.close();
        }
    }
}
