//! CollectorSink: accumulates everything arriving on `main`.
//!
//! The sink half goes into the pipeline; the [`CollectorHandle`] half
//! stays with the caller to inspect or wait on the results.

use crate::pipeline::element::{Process, ProcessContext, MAIN_PORT};
use crate::value::Value;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Store {
    values: Mutex<Vec<Value>>,
    arrived: Condvar,
}

pub struct CollectorSink {
    store: Arc<Store>,
}

/// Read side of a [`CollectorSink`].
#[derive(Clone)]
pub struct CollectorHandle {
    store: Arc<Store>,
}

impl CollectorSink {
    pub fn new() -> (Self, CollectorHandle) {
        let store = Arc::new(Store::default());
        (
            Self {
                store: Arc::clone(&store),
            },
            CollectorHandle { store },
        )
    }
}

impl Process for CollectorSink {
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> anyhow::Result<()> {
        let value = ctx.take(MAIN_PORT)?;
        self.store.values.lock().push(value);
        self.store.arrived.notify_all();
        Ok(())
    }
}

impl CollectorHandle {
    /// Copy of everything collected so far, in arrival order.
    pub fn values(&self) -> Vec<Value> {
        self.store.values.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.store.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.store.values.lock().clear();
    }

    /// Block until at least `count` values arrived. Returns false on timeout.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut values = self.store.values.lock();
        while values.len() < count {
            if self
                .store
                .arrived
                .wait_until(&mut values, deadline)
                .timed_out()
            {
                return values.len() >= count;
            }
        }
        true
    }
}
