//! Concurrent reconciliation across names
//!
//! Different names reconcile in parallel. Calls for the same name queue on a
//! per-name lock, so a unit is never converged by two tasks at once. A lock
//! is dropped from the map once nobody holds or waits on it.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cluster::{ActionExecutor, EventRecorder, StateStore};
use crate::controller::Controller;
use crate::error::Result;

/// Outcome of one reconcile in a batch
pub type Outcome = (String, Result<()>);

pub struct Dispatcher<S, E, R> {
    controller: Arc<Controller<S, E, R>>,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S, E, R> Dispatcher<S, E, R>
where
    S: StateStore,
    E: ActionExecutor,
    R: EventRecorder,
{
    pub fn new(controller: Controller<S, E, R>) -> Self {
        Self::from_arc(Arc::new(controller))
    }

    pub fn from_arc(controller: Arc<Controller<S, E, R>>) -> Self {
        Self {
            controller,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn controller(&self) -> &Arc<Controller<S, E, R>> {
        &self.controller
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock for `name` when the caller holds the last handle
    /// outside the map
    fn release(&self, name: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under the map lock, so the count is stable here
        let idle = locks.get(name).is_some_and(|l| Arc::ptr_eq(l, lock)) && Arc::strong_count(lock) == 2;
        if idle {
            locks.remove(name);
        }
    }

    /// Number of names with a live lock
    pub fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Reconcile one name, waiting for any in-flight reconcile of it
    pub async fn reconcile(&self, name: &str) -> Result<()> {
        let lock = self.lock_for(name);
        let result = {
            let _guard = lock.lock().await;
            self.controller.reconcile(name).await
        };
        self.release(name, &lock);
        result
    }

    /// Reconcile many names concurrently; one outcome per name, in order
    pub async fn reconcile_all<I>(&self, names: I) -> Vec<Outcome>
    where
        I: IntoIterator<Item = String>,
    {
        let outcomes = join_all(names.into_iter().map(|name| async move {
            let result = self.reconcile(&name).await;
            (name, result)
        }))
        .await;

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "some reconciles failed");
        } else {
            debug!(total = outcomes.len(), "reconciled batch");
        }
        outcomes
    }

    /// Reconcile every stored unit plus any extra names, such as live
    /// namespaces that may no longer be declared
    pub async fn reconcile_known<I>(&self, extra: I) -> Result<Vec<Outcome>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = self
            .controller
            .store()
            .list_units()
            .await?
            .iter()
            .map(|u| u.name().to_string())
            .collect();
        names.extend(extra);
        names.sort();
        names.dedup();
        Ok(self.reconcile_all(names).await)
    }
}
