//! Round-robin credential pool
//!
//! Hands out one credential per call, cycling through a fixed list. The
//! cursor is the only state shared between concurrently running research
//! tasks, so it sits behind a single mutex.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::CredentialError;

/// A credential handed out by [`RotatingCredentials::next`]
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Zero-based position in the pool
    pub index: usize,
    pub secret: String,
}

// Keep secrets out of logs and panic messages.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("secret", &"***")
            .finish()
    }
}

/// Fixed pool of credentials handed out in cyclic order.
///
/// Exhausted credentials are never removed; quotas are assumed to be
/// time-windowed, so a credential gets retried on its next natural turn.
pub struct RotatingCredentials {
    label: String,
    secrets: Vec<String>,
    cursor: Mutex<usize>,
}

impl RotatingCredentials {
    /// Create a pool; fails if `secrets` is empty
    pub fn new(label: impl Into<String>, secrets: Vec<String>) -> Result<Self, CredentialError> {
        if secrets.is_empty() {
            return Err(CredentialError::EmptyPool);
        }
        Ok(Self {
            label: label.into(),
            secrets,
            cursor: Mutex::new(0),
        })
    }

    /// Load `PREFIX_1`, `PREFIX_2`, ... until the first gap, falling back
    /// to a single `PREFIX` variable.
    pub fn from_env(prefix: &str) -> Result<Self, CredentialError> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, CredentialError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut secrets = Vec::new();
        for i in 1.. {
            match lookup(&format!("{}_{}", prefix, i)).filter(|v| !v.trim().is_empty()) {
                Some(secret) => secrets.push(secret),
                None => break,
            }
        }

        if secrets.is_empty() {
            if let Some(single) = lookup(prefix).filter(|v| !v.trim().is_empty()) {
                warn!(
                    prefix,
                    "Only a single key found; use {}_1, {}_2, ... to enable rotation", prefix, prefix
                );
                secrets.push(single);
            }
        }

        if secrets.is_empty() {
            return Err(CredentialError::NotFound(prefix.to_string()));
        }

        info!(prefix, count = secrets.len(), "Loaded credentials");
        Self::new(prefix, secrets)
    }

    /// Next credential in cyclic order
    pub fn next(&self) -> Credential {
        // A poisoned cursor is still a valid integer; keep rotating.
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let index = *cursor;
        *cursor = (index + 1) % self.secrets.len();
        drop(cursor);

        debug!(pool = %self.label, key = index + 1, total = self.secrets.len(), "Using credential");
        Credential {
            index,
            secret: self.secrets[index].clone(),
        }
    }

    /// Pool size
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Always false; an empty pool cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for RotatingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingCredentials")
            .field("label", &self.label)
            .field("len", &self.secrets.len())
            .finish()
    }
}
