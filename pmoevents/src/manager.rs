//! ObservationManager : hub pub/sub de la bibliothèque.
//!
//! Observers register for a set of [`EventKind`]s. Events are delivered
//! either synchronously on the caller's thread ([`ObservationManager::notify_sync`])
//! or through a single background delivery thread fed by a crossbeam
//! channel ([`ObservationManager::notify`]), which keeps FIFO order for
//! asynchronous events. Every notified event, whatever the path, becomes
//! the last occurrence of its kind.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::{Details, Event, EventKind, FnObserver, Observer, ObserverFailure};

/// Handle partagé vers un observateur enregistré.
pub type ObserverHandle = Arc<dyn Observer>;

pub const DEFAULT_THREAD_NAME: &str = "pmoevents-delivery";

/// Options de démarrage du manager.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Capacity of the asynchronous queue, 0 for unbounded.
    pub queue_capacity: usize,
    pub thread_name: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 0,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

/// Outcome of one synchronous delivery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

enum Message {
    Deliver(Event),
    Flush(Sender<()>),
}

struct Shared {
    /// Observers per kind, in registration order.
    observers: RwLock<HashMap<EventKind, Vec<ObserverHandle>>>,
    /// Last event recorded per kind.
    history: RwLock<HashMap<EventKind, Event>>,
    rx: Receiver<Message>,
    /// Messages queued by observers running on the delivery thread. Always
    /// consumed before the channel.
    backlog: Mutex<VecDeque<Message>>,
}

impl Shared {
    fn new(rx: Receiver<Message>) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            rx,
            backlog: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues `message` from the delivery thread without blocking on the
    /// channel. Pending channel messages move to the backlog first so the
    /// notification order is kept.
    fn defer(&self, message: Message) {
        let mut backlog = self.backlog.lock();
        backlog.extend(self.rx.try_iter());
        backlog.push_back(message);
    }

    fn next_message(&self) -> Option<Message> {
        let deferred = self.backlog.lock().pop_front();
        match deferred {
            Some(message) => Some(message),
            None => self.rx.recv().ok(),
        }
    }
}

pub struct ObservationManager {
    shared: Arc<Shared>,
    /// Dropped on shutdown so the delivery thread drains and exits.
    tx: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: thread::ThreadId,
}

impl ObservationManager {
    /// Starts the manager and its delivery thread.
    pub fn new(options: ManagerOptions) -> io::Result<Self> {
        let (tx, rx) = if options.queue_capacity == 0 {
            unbounded::<Message>()
        } else {
            bounded::<Message>(options.queue_capacity)
        };
        let shared = Arc::new(Shared::new(rx));

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || run_delivery(worker_shared))?;
        let worker_id = handle.thread().id();

        info!(
            thread = %options.thread_name,
            capacity = options.queue_capacity,
            "Observation manager started"
        );

        Ok(Self {
            shared,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
            worker_id,
        })
    }

    // ------------------------------------------------------------------
    // Enregistrement
    // ------------------------------------------------------------------

    /// Adds `observer` to every kind in `kinds`. Union semantics: kinds
    /// already held by this observer are left as they are.
    pub fn register(&self, observer: ObserverHandle, kinds: &[EventKind]) {
        let mut table = self.shared.observers.write();
        for kind in kinds {
            let list = table.entry(*kind).or_default();
            if !list.iter().any(|o| same_observer(o, &observer)) {
                list.push(observer.clone());
            }
        }
        debug!(observer = observer.name(), kinds = ?kinds, "Observer registered");
    }

    /// Registers the observer for its own [`Observer::interests`].
    pub fn subscribe(&self, observer: ObserverHandle) {
        let kinds = observer.interests();
        self.register(observer, &kinds);
    }

    /// Wraps a closure into an observer and registers it.
    ///
    /// Keep the returned handle to unregister it later.
    pub fn register_fn<F>(&self, name: &str, kinds: &[EventKind], callback: F) -> ObserverHandle
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let observer: ObserverHandle = Arc::new(FnObserver::new(name, kinds, callback));
        self.register(observer.clone(), kinds);
        observer
    }

    /// Removes the observer from every kind. Returns `true` if it was registered.
    pub fn unregister(&self, observer: &ObserverHandle) -> bool {
        let mut table = self.shared.observers.write();
        let mut found = false;
        for list in table.values_mut() {
            let before = list.len();
            list.retain(|o| !same_observer(o, observer));
            found |= list.len() != before;
        }
        table.retain(|_, list| !list.is_empty());
        found
    }

    /// Removes the observer from one kind only.
    pub fn unregister_kind(&self, kind: EventKind, observer: &ObserverHandle) -> bool {
        let mut table = self.shared.observers.write();
        let Some(list) = table.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|o| !same_observer(o, observer));
        let found = list.len() != before;
        if list.is_empty() {
            table.remove(&kind);
        }
        found
    }

    pub fn is_registered(&self, kind: EventKind, observer: &ObserverHandle) -> bool {
        self.shared
            .observers
            .read()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|o| same_observer(o, observer)))
    }

    pub fn observer_count(&self, kind: EventKind) -> usize {
        self.shared
            .observers
            .read()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    // ------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------

    /// Queues the event for the delivery thread and returns immediately.
    ///
    /// Events of one kind reach observers in the order they were queued.
    /// After [`shutdown`](Self::shutdown) the event is still recorded as
    /// last occurrence but nobody receives it.
    ///
    /// Never blocks when called by an observer running on the delivery
    /// thread, even if the queue is bounded and full.
    pub fn notify(&self, event: Event) {
        self.record(&event);

        let sender = self.tx.lock().clone();
        let Some(sender) = sender else {
            debug!(kind = %event.kind, "Manager stopped, event not delivered");
            return;
        };

        if thread::current().id() == self.worker_id {
            self.shared.defer(Message::Deliver(event));
            return;
        }

        let kind = event.kind;
        if sender.send(Message::Deliver(event)).is_err() {
            warn!(kind = %kind, "Dropping event because the delivery thread is gone");
        }
    }

    /// Delivers the event on the calling thread to every observer currently
    /// registered for its kind, in registration order.
    ///
    /// No lock is held while observers run, so an observer may notify
    /// again or call back into registries.
    pub fn notify_sync(&self, event: Event) -> DeliveryReport {
        self.record(&event);
        deliver(&self.shared, &event)
    }

    /// Waits until every event queued by [`notify`](Self::notify) before
    /// this call has been delivered.
    ///
    /// Returns immediately when called from the delivery thread itself.
    pub fn flush(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let sender = self.tx.lock().clone();
        let Some(sender) = sender else {
            return;
        };
        let (ack_tx, ack_rx) = bounded::<()>(1);
        if sender.send(Message::Flush(ack_tx)).is_ok() {
            drop(sender);
            let _ = ack_rx.recv();
        }
    }

    /// Drains the async queue, stops the delivery thread and drops every
    /// registration. Idempotent.
    pub fn shutdown(&self) {
        let Some(sender) = self.tx.lock().take() else {
            return;
        };
        drop(sender);

        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Delivery thread terminated abnormally");
            }
        }

        self.shared.observers.write().clear();
        info!("Observation manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Cache des dernières occurrences
    // ------------------------------------------------------------------

    /// Keeps the event with the highest sequence number per kind.
    fn record(&self, event: &Event) {
        let mut history = self.shared.history.write();
        if let Some(existing) = history.get(&event.kind) {
            if existing.sequence > event.sequence {
                trace!(
                    kind = %event.kind,
                    sequence = event.sequence,
                    latest = existing.sequence,
                    "Older event, last occurrence kept"
                );
                return;
            }
        }
        trace!(kind = %event.kind, sequence = event.sequence, "Recording last occurrence");
        history.insert(event.kind, event.clone());
    }

    /// True once any event of `kind` has been notified.
    pub fn contains_event(&self, kind: EventKind) -> bool {
        self.shared.history.read().contains_key(&kind)
    }

    /// Detail bag of the most recent event of `kind`.
    pub fn last_occurrence(&self, kind: EventKind) -> Option<Details> {
        self.shared
            .history
            .read()
            .get(&kind)
            .map(|event| event.details.clone())
    }

    /// Value of `key` in the most recent event of `kind`.
    pub fn get_detail_last_occurrence(&self, kind: EventKind, key: &str) -> Option<Value> {
        self.shared
            .history
            .read()
            .get(&kind)
            .and_then(|event| event.details.get(key).cloned())
    }

    pub fn clear_history(&self) {
        self.shared.history.write().clear();
    }
}

impl Drop for ObservationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn same_observer(a: &ObserverHandle, b: &ObserverHandle) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

fn run_delivery(shared: Arc<Shared>) {
    // Se termine quand le dernier Sender est relâché (shutdown) et que
    // le backlog est vide
    while let Some(message) = shared.next_message() {
        match message {
            Message::Deliver(event) => {
                deliver(&shared, &event);
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Delivery thread exiting");
}

fn deliver(shared: &Shared, event: &Event) -> DeliveryReport {
    let targets: Vec<ObserverHandle> = shared
        .observers
        .read()
        .get(&event.kind)
        .cloned()
        .unwrap_or_default();

    let mut report = DeliveryReport::default();
    for observer in targets {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.handle(event)));
        let failure = match outcome {
            Ok(Ok(())) => {
                report.delivered += 1;
                continue;
            }
            Ok(Err(err)) => ObserverFailure::Failed {
                observer: observer.name().to_string(),
                kind: event.kind,
                message: format!("{err:#}"),
            },
            Err(payload) => ObserverFailure::Panicked {
                observer: observer.name().to_string(),
                kind: event.kind,
                message: panic_message(payload.as_ref()),
            },
        };
        warn!("{}", failure);
        report.failed += 1;
    }
    report
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
