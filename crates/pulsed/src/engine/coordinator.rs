//! Shared update signal between a polling task and the entities it feeds.

use tokio::sync::watch;
use tracing::debug;

/// Receiver half handed to listeners. `changed().await` resolves once per
/// update generation; generations published while a listener is busy are
/// coalesced.
pub type CoordinatorListener = watch::Receiver<u64>;

/// Data update coordinator
///
/// The integration's polling task calls [`set_updated`](Self::set_updated)
/// whenever the vendor data may have changed; every registered listener then
/// refreshes the entities that read from that data.
#[derive(Debug)]
pub struct DataUpdateCoordinator {
    name: String,
    generation: watch::Sender<u64>,
}

impl DataUpdateCoordinator {
    pub fn new(name: impl Into<String>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            name: name.into(),
            generation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register for update callbacks.
    pub fn add_listener(&self) -> CoordinatorListener {
        self.generation.subscribe()
    }

    /// Signal that data changed. Returns the new generation.
    pub fn set_updated(&self) -> u64 {
        let mut current = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            current = *g;
        });
        debug!(
            "Coordinator {} data updated (generation {}, {} listeners)",
            self.name,
            current,
            self.generation.receiver_count()
        );
        current
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }
}
