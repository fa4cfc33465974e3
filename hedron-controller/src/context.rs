//! Reconcile context
//!
//! Everything a reconciler needs besides the key it was handed: the store,
//! the source resolver, a clock and the Project poll interval. Reconcilers
//! keep no state of their own between passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hedron_core::domain::meta::Resource;

use crate::source::SourceResolver;
use crate::store::{Api, ObjectStore};

/// Source of "now" for status timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared, read-only state handed to every reconcile pass
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub resolver: Arc<dyn SourceResolver>,
    pub clock: Arc<dyn Clock>,
    /// How long a Project waits before its source is resolved again
    pub poll_interval: Duration,
}

impl Context {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        resolver: Arc<dyn SourceResolver>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            clock: Arc::new(SystemClock),
            poll_interval,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Typed store access for one kind
    pub fn api<K: Resource>(&self) -> Api<K> {
        Api::new(Arc::clone(&self.store))
    }
}
