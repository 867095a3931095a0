use thiserror::Error;

use crate::EventKind;

/// Échec isolé d'un observateur.
///
/// Never returned to the notifier: the manager logs it and keeps delivering.
#[derive(Error, Debug)]
pub enum ObserverFailure {
    #[error("observer '{observer}' failed on {kind}: {message}")]
    Failed {
        observer: String,
        kind: EventKind,
        message: String,
    },
    #[error("observer '{observer}' panicked on {kind}: {message}")]
    Panicked {
        observer: String,
        kind: EventKind,
        message: String,
    },
}

impl ObserverFailure {
    pub fn observer(&self) -> &str {
        match self {
            ObserverFailure::Failed { observer, .. } | ObserverFailure::Panicked { observer, .. } => {
                observer
            }
        }
    }
}
