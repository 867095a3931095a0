//! # pmoevents - Bus d'observation de la bibliothèque musicale
//!
//! Cette crate fournit le hub de notification partagé par les registres
//! de la bibliothèque et par leurs collaborateurs (UI, lecture, scan) :
//!
//! - **Event** : valeur immuable (type + sac de détails)
//! - **Observer** : capacité d'observation (types d'intérêt + `handle`)
//! - **ObservationManager** : livraison synchrone ou asynchrone, isolation
//!   des échecs, cache de la dernière occurrence par type
//!
//! # Exemple
//!
//! ```no_run
//! use pmoevents::{Event, EventKind, ManagerOptions, ObservationManager};
//!
//! let manager = ObservationManager::new(ManagerOptions::default())?;
//! manager.register_fn("logger", &[EventKind::TrackAdded], |event| {
//!     println!("track added: {:?}", event.detail_str("name"));
//!     Ok(())
//! });
//!
//! manager.notify(Event::new(EventKind::TrackAdded).with("name", "song.mp3"));
//! manager.flush();
//! # Ok::<(), std::io::Error>(())
//! ```

mod error;
mod event;
mod kind;
mod manager;
mod observer;

pub use error::ObserverFailure;
pub use event::{keys, Details, Event};
pub use kind::EventKind;
pub use manager::{
    DeliveryReport, ManagerOptions, ObservationManager, ObserverHandle, DEFAULT_THREAD_NAME,
};
pub use observer::{FnObserver, Observer};
