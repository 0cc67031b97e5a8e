//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use cadence_chat::TurnOrchestrator;
use cadence_core::events::EventBus;

/// Shared application state.
///
/// All fields are cheap to clone; handlers receive a clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Turn engine and session store.
    pub orchestrator: Arc<TurnOrchestrator>,
    /// Same bus the orchestrator publishes into; feeds the SSE stream.
    pub events: EventBus,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: TurnOrchestrator) -> Self {
        let events = orchestrator.events().clone();
        Self {
            orchestrator: Arc::new(orchestrator),
            events,
            start_time: Instant::now(),
        }
    }
}
