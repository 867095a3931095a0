use std::fmt;

use crate::{Event, EventKind};

/// Capacité d'observation : un ensemble de types d'intérêt et un handler.
///
/// UI panels, registries' cascade adapters and test doubles all implement
/// this trait. `handle` may fail or even panic; the manager isolates both.
pub trait Observer: Send + Sync {
    /// Name used in logs when the observer fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Kinds the observer wants when registered through
    /// [`ObservationManager::subscribe`](crate::ObservationManager::subscribe).
    fn interests(&self) -> Vec<EventKind> {
        Vec::new()
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

type Callback = Box<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Observer backed by a closure.
pub struct FnObserver {
    name: String,
    interests: Vec<EventKind>,
    callback: Callback,
}

impl FnObserver {
    pub fn new<F>(name: impl Into<String>, interests: &[EventKind], callback: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            interests: interests.to_vec(),
            callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for FnObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver")
            .field("name", &self.name)
            .field("interests", &self.interests)
            .finish_non_exhaustive()
    }
}

impl Observer for FnObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn interests(&self) -> Vec<EventKind> {
        self.interests.clone()
    }

    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.callback)(event)
    }
}
