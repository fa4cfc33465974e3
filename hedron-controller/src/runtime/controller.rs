//! Controller runtime
//!
//! Feeds the reconcile entry points. Store change events and a periodic
//! resync put requests on a shared work queue; a fixed pool of workers takes
//! them off, runs the matching entry point under a timeout, and decides from
//! the outcome whether and when the key comes back.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hedron_core::domain::meta::{Kind, ObjectKey};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::queue::WorkQueue;
use crate::config::Config;
use crate::context::Context;
use crate::error::{ErrorClass, ReconcileError};
use crate::reconciler::{self, Action};
use crate::store::{Change, ObjectEvent, ObjectStore};

/// A unit of work: reconcile the object `key` of kind `kind`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub kind: Kind,
    pub key: ObjectKey,
}

impl Request {
    pub fn new(kind: Kind, key: ObjectKey) -> Self {
        Self { kind, key }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Runtime tunables, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub workers: usize,
    pub resync_interval: Duration,
    pub reconcile_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            workers: config.workers,
            resync_interval: config.resync_interval,
            reconcile_timeout: config.reconcile_timeout,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

pub struct Controller {
    ctx: Context,
    settings: ControllerSettings,
    queue: Arc<WorkQueue<Request>>,
    backoff: Arc<Backoff<Request>>,
}

impl Controller {
    pub fn new(ctx: Context, settings: ControllerSettings) -> Self {
        let backoff = Backoff::new(settings.backoff_base, settings.backoff_max);
        Self {
            ctx,
            settings,
            queue: Arc::new(WorkQueue::new()),
            backoff: Arc::new(backoff),
        }
    }

    /// The queue the workers consume, for enqueuing requests by hand
    pub fn queue(&self) -> Arc<WorkQueue<Request>> {
        Arc::clone(&self.queue)
    }

    /// Runs until `shutdown` completes, then lets in-flight reconciles finish
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) {
        info!(
            "Starting controller ({} workers, resync every {:?})",
            self.settings.workers, self.settings.resync_interval
        );

        // Subscribe before the first resync lists anything, so no change
        // between the two goes unseen
        let events = self.ctx.store.watch();
        let pump = tokio::spawn(pump_events(
            events,
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.queue),
        ));
        let resync = tokio::spawn(resync_loop(
            Arc::clone(&self.ctx.store),
            Arc::clone(&self.queue),
            self.settings.resync_interval,
        ));

        let workers: Vec<_> = (0..self.settings.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    self.ctx.clone(),
                    Arc::clone(&self.queue),
                    Arc::clone(&self.backoff),
                    self.settings.reconcile_timeout,
                ))
            })
            .collect();

        shutdown.await;
        info!("Shutting down controller");

        pump.abort();
        resync.abort();
        self.queue.shut_down();

        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Worker task panicked: {}", e);
            }
        }

        info!("Controller stopped");
    }
}

/// Maps one store event onto the requests it should trigger
///
/// `generations` remembers the last seen generation of every Project so that
/// status-only writes, which leave the generation alone, do not re-trigger
/// the Project entry point.
pub fn requests_for(event: &ObjectEvent, generations: &mut HashMap<ObjectKey, u64>) -> Vec<Request> {
    let key = event.key();

    match (event.kind, event.change) {
        (Kind::Project, Change::Deleted) => {
            generations.remove(&key);
            Vec::new()
        }
        (Kind::Project, _) => {
            let generation = event.metadata.generation;
            if generations.insert(key.clone(), generation) == Some(generation) {
                return Vec::new();
            }
            vec![Request::new(Kind::Project, key)]
        }
        // A deleted child sends its owner back through reconciliation, which
        // recreates it if it is still wanted
        (Kind::Revision | Kind::Job, Change::Deleted) => event
            .owner()
            .map(|owner| Request::new(owner.kind, ObjectKey::new(&key.namespace, &owner.name)))
            .into_iter()
            .collect(),
        (kind, _) => vec![Request::new(kind, key)],
    }
}

async fn pump_events(
    mut events: broadcast::Receiver<ObjectEvent>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<WorkQueue<Request>>,
) {
    let mut generations = HashMap::new();

    loop {
        match events.recv().await {
            Ok(event) => {
                for request in requests_for(&event, &mut generations) {
                    debug!("{:?} {} -> {}", event.change, event.kind, request);
                    queue.add(request);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!("Watch fell behind by {} events, resyncing", missed);
                enqueue_all(store.as_ref(), &queue).await;
            }
            Err(RecvError::Closed) => {
                debug!("Watch closed");
                break;
            }
        }
    }
}

async fn resync_loop(store: Arc<dyn ObjectStore>, queue: Arc<WorkQueue<Request>>, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        debug!("Resyncing all objects");
        enqueue_all(store.as_ref(), &queue).await;
    }
}

/// Enqueues every stored object of every kind
pub async fn enqueue_all(store: &dyn ObjectStore, queue: &WorkQueue<Request>) {
    for kind in Kind::ALL {
        match store.list(kind, None).await {
            Ok(objects) => {
                for object in objects {
                    queue.add(Request::new(kind, object.key()));
                }
            }
            Err(e) => warn!("Failed to list {} objects for resync: {}", kind, e),
        }
    }
}

async fn worker(
    id: usize,
    ctx: Context,
    queue: Arc<WorkQueue<Request>>,
    backoff: Arc<Backoff<Request>>,
    timeout: Duration,
) {
    debug!("Worker {} started", id);

    while let Some(request) = queue.get().await {
        let outcome = time::timeout(timeout, reconciler::reconcile(&ctx, request.kind, &request.key))
            .await
            .unwrap_or(Err(ReconcileError::Timeout(timeout)));

        handle_outcome(&queue, &backoff, &request, outcome);
        queue.done(&request);
    }

    debug!("Worker {} stopped", id);
}

fn handle_outcome(
    queue: &Arc<WorkQueue<Request>>,
    backoff: &Backoff<Request>,
    request: &Request,
    outcome: Result<Action, ReconcileError>,
) {
    let err = match outcome {
        Ok(action) => {
            backoff.forget(request);
            if let Some(after) = action.requeue_after {
                queue.add_after(request.clone(), after);
            }
            return;
        }
        Err(err) => err,
    };

    match err.class() {
        ErrorClass::NotFound => {
            debug!("{} vanished during reconcile: {}", request, err);
            backoff.forget(request);
        }
        ErrorClass::Permanent => {
            error!("Reconcile of {} failed permanently: {}", request, err);
            backoff.forget(request);
        }
        ErrorClass::Transient | ErrorClass::Conflict => {
            let delay = backoff.next_delay(request.clone());
            warn!("Reconcile of {} failed, retrying in {:?}: {}", request, delay, err);
            queue.add_after(request.clone(), delay);
        }
    }
}
