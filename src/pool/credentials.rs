//! Credential pool with rotation and cooldown
//!
//! Holds the upstream cookies in configured order. Selection is either a
//! uniform pick over the available set or a round-robin advance that
//! skips cooled-down and disabled slots. A credential is available iff it
//! is not disabled and its cooldown has lapsed. All retry loops bound
//! themselves by the available count observed at entry, so a credential
//! recovering mid-loop never extends the loop.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::error::{AppError, AppResult};

#[derive(Debug)]
struct Slot {
    cookie: String,
    cooldown_until: Option<Instant>,
    disabled: bool,
}

impl Slot {
    fn available(&self, now: Instant) -> bool {
        !self.disabled && self.cooldown_until.map_or(true, |until| now >= until)
    }
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Pool of upstream credentials shared by all requests
#[derive(Debug)]
pub struct CredentialPool {
    inner: RwLock<PoolInner>,
}

impl CredentialPool {
    pub fn new(cookies: impl IntoIterator<Item = String>) -> Self {
        let slots = cookies
            .into_iter()
            .map(|cookie| Slot {
                cookie,
                cooldown_until: None,
                disabled: false,
            })
            .collect();
        Self {
            inner: RwLock::new(PoolInner { slots, cursor: 0 }),
        }
    }

    /// Uniform pick from the available set.
    pub fn random(&self) -> AppResult<String> {
        let now = Instant::now();
        let inner = self.inner.read().unwrap();
        let available: Vec<&Slot> = inner.slots.iter().filter(|s| s.available(now)).collect();
        if available.is_empty() {
            return Err(AppError::NoCredentials);
        }
        let idx = rand::thread_rng().gen_range(0..available.len());
        Ok(available[idx].cookie.clone())
    }

    /// Advance the round-robin cursor past unavailable slots.
    ///
    /// The cursor moves under the write lock, so concurrent callers get
    /// distinct credentials whenever two or more are available.
    pub fn next(&self) -> AppResult<String> {
        let now = Instant::now();
        let mut inner = self.inner.write().unwrap();
        let len = inner.slots.len();
        for _ in 0..len {
            let idx = inner.cursor % len.max(1);
            inner.cursor = inner.cursor.wrapping_add(1);
            if inner.slots[idx].available(now) {
                return Ok(inner.slots[idx].cookie.clone());
            }
        }
        Err(AppError::NoCredentials)
    }

    /// Suspend a credential until `Instant::now() + duration`.
    pub fn cooldown(&self, cookie: &str, duration: Duration) {
        let until = Instant::now() + duration;
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.cookie == cookie) {
            slot.cooldown_until = Some(until);
        }
    }

    /// Disable a credential for the rest of the process lifetime.
    pub fn remove(&self, cookie: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.cookie == cookie) {
            slot.disabled = true;
        }
    }

    /// Number of currently available credentials.
    pub fn available_count(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.read().unwrap();
        inner.slots.iter().filter(|s| s.available(now)).count()
    }

    /// Total slots, disabled included.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
