//! Notifier that keeps every event in memory.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use crate::sync::ports::{NotifyError, RunCompletedEvent, RunNotifier};

/// Records run completion events for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunNotifier {
    events: Arc<RwLock<Vec<RunCompletedEvent>>>,
}

impl RecordingRunNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<RunCompletedEvent> {
        self.events
            .read()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RunNotifier for RecordingRunNotifier {
    async fn notify(&self, event: &RunCompletedEvent) -> Result<(), NotifyError> {
        let mut events = self
            .events
            .write()
            .map_err(|err| NotifyError::delivery(std::io::Error::other(err.to_string())))?;
        events.push(event.clone());
        Ok(())
    }
}
