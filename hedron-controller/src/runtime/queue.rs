//! Deduplicating work queue
//!
//! An item sits in the queue at most once. While a worker holds an item it is
//! "processing"; adding it again only marks it dirty, and `done` puts it back
//! at the tail. This is what keeps reconciles of the same key from ever
//! overlapping.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct State<T> {
    queue: VecDeque<T>,
    /// Items that need processing: queued, or re-added while in flight
    dirty: HashSet<T>,
    processing: HashSet<T>,
    /// Deadline of the pending delayed add for each item
    waiting: HashMap<T, Instant>,
    shutting_down: bool,
}

pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                waiting: HashMap::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks `item` as needing work
    pub fn add(&self, item: T) {
        {
            let mut state = self.lock();
            if state.shutting_down || !state.dirty.insert(item.clone()) {
                return;
            }
            if state.processing.contains(&item) {
                // Re-queued by `done`
                return;
            }
            state.queue.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Adds `item` once `delay` has passed
    ///
    /// If a delayed add for the same item is already pending, the earlier of
    /// the two deadlines wins.
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let deadline = Instant::now() + delay;
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            if matches!(state.waiting.get(&item), Some(existing) if *existing <= deadline) {
                return;
            }
            state.waiting.insert(item.clone(), deadline);
        }

        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let Some(queue) = queue.upgrade() else {
                return;
            };

            let due = {
                let mut state = queue.lock();
                if state.waiting.get(&item) == Some(&deadline) {
                    state.waiting.remove(&item);
                    true
                } else {
                    false
                }
            };

            if due {
                queue.add(item);
            }
        });
    }

    /// Waits for the next item; `None` once the queue is shut down
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Releases an item handed out by `get`
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(item);
            if !state.shutting_down && state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };

        if requeued {
            self.notify.notify_one();
        }
    }

    /// Stops handing out items and wakes every waiting worker
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Number of items ready to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
