use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use pmoevents::{
    Event, EventKind, ManagerOptions, ObservationManager, Observer, ObserverHandle,
};
use serde_json::Value;

/// Observateur de test qui journalise ce qu'il reçoit
struct Recorder {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    interests: Vec<EventKind>,
}

impl Recorder {
    fn new(label: &'static str, log: Arc<Mutex<Vec<String>>>, interests: &[EventKind]) -> Arc<Self> {
        Arc::new(Self {
            label,
            log,
            interests: interests.to_vec(),
        })
    }
}

impl Observer for Recorder {
    fn name(&self) -> &str {
        self.label
    }

    fn interests(&self) -> Vec<EventKind> {
        self.interests.clone()
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let value = event.detail("n").cloned().unwrap_or(Value::Null);
        self.log.lock().push(format!("{}:{}:{}", self.label, event.kind, value));
        Ok(())
    }
}

fn create_manager() -> ObservationManager {
    ObservationManager::new(ManagerOptions::default()).unwrap()
}

#[test]
fn test_sync_delivery_in_registration_order() {
    let manager = create_manager();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = Recorder::new("first", log.clone(), &[EventKind::TrackAdded]);
    let second = Recorder::new("second", log.clone(), &[EventKind::TrackAdded]);
    manager.subscribe(first);
    manager.subscribe(second);

    let report = manager.notify_sync(Event::new(EventKind::TrackAdded).with("n", 1));

    assert_eq!(report.delivered, 2);
    assert_eq!(
        *log.lock(),
        vec!["first:track_added:1".to_string(), "second:track_added:1".to_string()]
    );
}

#[test]
fn test_sync_delivery_survives_failures_and_panics() {
    let manager = create_manager();
    let log = Arc::new(Mutex::new(Vec::new()));

    manager.register_fn("fails", &[EventKind::PlaylistNeedsRefresh], |_| {
        Err(anyhow!("cannot refresh"))
    });
    manager.register_fn("panics", &[EventKind::PlaylistNeedsRefresh], |_| {
        panic!("observer blew up")
    });
    let last = Recorder::new("last", log.clone(), &[EventKind::PlaylistNeedsRefresh]);
    manager.subscribe(last);

    let report = manager.notify_sync(Event::new(EventKind::PlaylistNeedsRefresh).with("n", 7));

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(*log.lock(), vec!["last:playlist_needs_refresh:7".to_string()]);
}

#[test]
fn test_only_interested_observers_receive() {
    let manager = create_manager();
    let log = Arc::new(Mutex::new(Vec::new()));

    manager.subscribe(Recorder::new("tracks", log.clone(), &[EventKind::TrackRemoved]));
    manager.subscribe(Recorder::new("volume", log.clone(), &[EventKind::VolumeChanged]));

    manager.notify_sync(Event::new(EventKind::VolumeChanged).with("n", 3));

    assert_eq!(*log.lock(), vec!["volume:volume_changed:3".to_string()]);
}

#[test]
fn test_async_delivery_keeps_fifo_order() {
    let manager = create_manager();
    let log = Arc::new(Mutex::new(Vec::new()));
    manager.subscribe(Recorder::new("async", log.clone(), &[EventKind::CurrentTrackChanged]));

    for n in 0..100 {
        manager.notify(Event::new(EventKind::CurrentTrackChanged).with("n", n));
    }
    manager.flush();

    let expected: Vec<String> = (0..100)
        .map(|n| format!("async:current_track_changed:{}", n))
        .collect();
    assert_eq!(*log.lock(), expected);
}

#[test]
fn test_async_delivery_runs_on_delivery_thread() {
    let manager = ObservationManager::new(ManagerOptions {
        queue_capacity: 4,
        thread_name: "test-delivery".into(),
    })
    .unwrap();
    let seen = Arc::new(Mutex::new(None::<String>));

    let seen_clone = seen.clone();
    manager.register_fn("thread-check", &[EventKind::LibraryScanStarted], move |_| {
        *seen_clone.lock() = thread::current().name().map(str::to_string);
        Ok(())
    });

    manager.notify(Event::new(EventKind::LibraryScanStarted));
    manager.flush();

    assert_eq!(seen.lock().as_deref(), Some("test-delivery"));
}

#[test]
fn test_async_observer_can_notify_on_full_bounded_queue() {
    let manager = Arc::new(
        ObservationManager::new(ManagerOptions {
            queue_capacity: 1,
            thread_name: "bounded-delivery".into(),
        })
        .unwrap(),
    );
    let log = Arc::new(Mutex::new(Vec::new()));
    manager.subscribe(Recorder::new("volume", log.clone(), &[EventKind::VolumeChanged]));

    // Observateur asynchrone qui notifie plus que la file ne peut contenir
    let weak = Arc::downgrade(&manager);
    manager.register_fn("scan-fanout", &[EventKind::LibraryScanStarted], move |_| {
        if let Some(manager) = weak.upgrade() {
            for n in 0..3 {
                manager.notify(Event::new(EventKind::VolumeChanged).with("n", n));
            }
        }
        Ok(())
    });

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let notifier = manager.clone();
    thread::spawn(move || {
        notifier.notify(Event::new(EventKind::LibraryScanStarted));
        notifier.flush();
        let _ = done_tx.send(());
    });

    assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    manager.flush();
    assert_eq!(
        *log.lock(),
        vec![
            "volume:volume_changed:0".to_string(),
            "volume:volume_changed:1".to_string(),
            "volume:volume_changed:2".to_string(),
        ]
    );
}

#[test]
fn test_reentrant_notification_from_observer() {
    let manager = Arc::new(create_manager());
    let log = Arc::new(Mutex::new(Vec::new()));
    manager.subscribe(Recorder::new("refresh", log.clone(), &[EventKind::PlaylistNeedsRefresh]));

    // Un observateur qui notifie à son tour (cascade)
    let weak = Arc::downgrade(&manager);
    manager.register_fn("cascade", &[EventKind::TrackRenamed], move |event| {
        if let Some(manager) = weak.upgrade() {
            let n = event.detail("n").cloned().unwrap_or(Value::Null);
            manager.notify_sync(Event::new(EventKind::PlaylistNeedsRefresh).with("n", n));
        }
        Ok(())
    });

    manager.notify_sync(Event::new(EventKind::TrackRenamed).with("n", 5));

    assert_eq!(*log.lock(), vec!["refresh:playlist_needs_refresh:5".to_string()]);
    assert!(manager.contains_event(EventKind::PlaylistNeedsRefresh));
}

#[test]
fn test_flush_inside_async_observer_does_not_deadlock() {
    let manager = Arc::new(create_manager());
    let log = Arc::new(Mutex::new(Vec::new()));

    let weak = Arc::downgrade(&manager);
    let log_clone = log.clone();
    manager.register_fn("flusher", &[EventKind::LibraryScanFinished], move |_| {
        if let Some(manager) = weak.upgrade() {
            manager.flush();
        }
        log_clone.lock().push("flushed".to_string());
        Ok(())
    });

    manager.notify(Event::new(EventKind::LibraryScanFinished));
    manager.flush();

    assert_eq!(*log.lock(), vec!["flushed".to_string()]);
}

#[test]
fn test_last_occurrence_is_most_recent_event() {
    let manager = create_manager();
    assert!(manager.last_occurrence(EventKind::PlaybackStateChanged).is_none());

    for n in 1..=5 {
        manager.notify_sync(
            Event::new(EventKind::PlaybackStateChanged)
                .with("n", n)
                .with("state", if n % 2 == 0 { "paused" } else { "playing" }),
        );
    }

    let details = manager.last_occurrence(EventKind::PlaybackStateChanged).unwrap();
    assert_eq!(details.get("n"), Some(&Value::from(5)));
    assert_eq!(
        manager.get_detail_last_occurrence(EventKind::PlaybackStateChanged, "state"),
        Some(Value::from("playing"))
    );
    assert!(!manager.contains_event(EventKind::VolumeChanged));
}

#[test]
fn test_concurrent_notifiers() {
    let manager = Arc::new(create_manager());
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer: ObserverHandle = Recorder::new("all", log.clone(), &[EventKind::TrackAdded]);
    manager.subscribe(observer.clone());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let manager = manager.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    if n % 2 == 0 {
                        manager.notify(Event::new(EventKind::TrackAdded).with("n", t * 100 + n));
                    } else {
                        manager.notify_sync(Event::new(EventKind::TrackAdded).with("n", t * 100 + n));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    manager.flush();

    assert_eq!(log.lock().len(), 100);
    assert!(manager.unregister(&observer));
}
