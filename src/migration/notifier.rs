use crate::migration::run::{Run, StepRecord};
use crate::shared::ids::RunId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEventKind {
    RunStatusChanged,
    StepStatusChanged,
    StepProgressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub run: Run,
    pub step: Option<StepRecord>,
}

impl RunEvent {
    /// `(order, progress)` of the step the event is about.
    pub fn position(&self) -> Option<(u32, u8)> {
        self.step.as_ref().map(|step| (step.order, step.progress))
    }
}

type Callback = Arc<dyn Fn(&RunEvent) + Send + Sync>;

struct Subscriber {
    run_filter: Option<RunId>,
    callback: Callback,
}

#[derive(Default)]
struct NotifierInner {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
}

impl NotifierInner {
    fn subscribers(&self) -> MutexGuard<'_, BTreeMap<u64, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fans run events out to subscribers. Events are delivered synchronously on
/// the publishing thread, in publish order.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every event until the returned `Subscription` is dropped.
    ///
    /// Controllers publish while they hold the run's lock, so `callback` must
    /// not call back into a `RunHandle` of the run it observes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(callback))
    }

    /// Like [`Notifier::subscribe`], limited to events of `run_id`. The same
    /// rule applies: no `RunHandle` calls from inside `callback`.
    pub fn subscribe_run<F>(&self, run_id: RunId, callback: F) -> Subscription
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        self.insert(Some(run_id), Arc::new(callback))
    }

    /// Buffers every event into a channel; dropping the receiver makes later
    /// sends no-ops.
    pub fn subscribe_channel(&self) -> (Subscription, Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let subscription = self.subscribe(move |event| {
            let sender = tx.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = sender.send(event.clone());
        });
        (subscription, rx)
    }

    pub fn publish(&self, event: &RunEvent) {
        let callbacks = self
            .inner
            .subscribers()
            .values()
            .filter(|subscriber| {
                subscriber
                    .run_filter
                    .as_ref()
                    .map(|run_id| *run_id == event.run.id)
                    .unwrap_or(true)
            })
            .map(|subscriber| Arc::clone(&subscriber.callback))
            .collect::<Vec<_>>();
        // Called outside the lock so a callback may drop its own subscription.
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    fn insert(&self, run_filter: Option<RunId>, callback: Callback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers().insert(
            id,
            Subscriber {
                run_filter,
                callback,
            },
        );
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Disposer returned by `Notifier::subscribe*`. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<NotifierInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
