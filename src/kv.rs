//! Key-value store contract for shared belief state, plus an in-process implementation.
//!
//! Two kinds of entries live in a store:
//! - **field maps** (`field -> f64`), carrying a version stamp that changes on every write.
//!   These back per-arm beliefs and support compare-and-swap via
//!   [`KvStore::conditional_update`].
//! - **scalar values** (strings) with an optional time-to-live. These back the global mode flag
//!   and the transient per-arm last-reward signal.
//!
//! Any backend offering per-key version-stamped writes can implement [`KvStore`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{Fields, Result};

/// Version stamp of a field map. Never reused within one store, even across delete/recreate.
pub type Version = u64;

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied; carries the new version.
    Applied(Version),
    /// Another writer changed the entry since the expected version.
    Conflict,
    /// The entry does not exist (never created, or deleted since the read).
    Missing,
}

/// Shared store contract.
///
/// Implementations must make each individual call atomic with respect to every other call on
/// the same key. No cross-key atomicity is required.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a field map and its current version.
    async fn get_fields(&self, key: &str) -> Result<Option<Versioned<Fields>>>;

    /// Unconditionally replace a field map (creating it if absent).
    async fn set_fields(&self, key: &str, fields: Fields) -> Result<Version>;

    /// Replace a field map only if its version still equals `expected`.
    async fn conditional_update(
        &self,
        key: &str,
        expected: Version,
        fields: Fields,
    ) -> Result<CasOutcome>;

    /// Set a scalar value; with `Some(ttl)` it disappears after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Read a scalar value (expired values read as absent).
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Delete any entry under `key`. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Read and delete a scalar value.
    ///
    /// The default is a plain read followed by a delete; a write landing in between is lost.
    async fn take_value(&self, key: &str) -> Result<Option<String>> {
        let v = self.get_value(key).await?;
        if v.is_some() {
            self.delete(key).await?;
        }
        Ok(v)
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_version: Version,
    fields: HashMap<String, Versioned<Fields>>,
    values: HashMap<String, (String, Option<Instant>)>,
}

impl Inner {
    fn bump(&mut self) -> Version {
        self.next_version += 1;
        self.next_version
    }

    fn live_value(&mut self, key: &str, now: Instant) -> Option<&String> {
        let expired = matches!(self.values.get(key), Some((_, Some(at))) if *at <= now);
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(v, _)| v)
    }
}

/// In-process [`KvStore`] backed by a mutex-guarded map.
///
/// The lock is held only for the duration of one call and never across an `.await`.
/// Expiry uses `tokio::time::Instant`, so paused-clock tests control TTLs.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<Inner>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of field-map entries currently stored.
    pub fn field_entries(&self) -> usize {
        self.inner.lock().fields.len()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get_fields(&self, key: &str) -> Result<Option<Versioned<Fields>>> {
        Ok(self.inner.lock().fields.get(key).cloned())
    }

    async fn set_fields(&self, key: &str, fields: Fields) -> Result<Version> {
        let mut g = self.inner.lock();
        let version = g.bump();
        g.fields
            .insert(key.to_string(), Versioned { value: fields, version });
        Ok(version)
    }

    async fn conditional_update(
        &self,
        key: &str,
        expected: Version,
        fields: Fields,
    ) -> Result<CasOutcome> {
        let mut g = self.inner.lock();
        let current = match g.fields.get(key) {
            None => return Ok(CasOutcome::Missing),
            Some(e) => e.version,
        };
        if current != expected {
            return Ok(CasOutcome::Conflict);
        }
        let version = g.bump();
        g.fields
            .insert(key.to_string(), Versioned { value: fields, version });
        Ok(CasOutcome::Applied(version))
    }

    async fn set_with_expiry(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|t| Instant::now() + t);
        self.inner
            .lock()
            .values
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self.inner.lock().live_value(key, now).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut g = self.inner.lock();
        let a = g.fields.remove(key).is_some();
        let b = g.values.remove(key).is_some();
        Ok(a || b)
    }

    async fn take_value(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut g = self.inner.lock();
        let v = g.live_value(key, now).cloned();
        g.values.remove(key);
        Ok(v)
    }
}
