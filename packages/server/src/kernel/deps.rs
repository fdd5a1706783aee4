//! Server dependencies for commands (using traits for testability)
//!
//! This module provides the central dependency container used by every
//! listing, photo-session, media and favorites action. All external services
//! use trait abstractions so tests can swap in the in-memory store and spies.

use std::sync::Arc;

use crate::config::EngineSettings;
use crate::domains::listings::machines::StatusMachine;
use crate::kernel::nats::NatsPublisher;
use crate::kernel::store::BaseStore;
use crate::kernel::{BaseClock, BaseNotificationService, BaseObjectStorage, BaseProcessingQueue};

/// Server dependencies accessible to actions (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn BaseStore>,
    pub storage: Arc<dyn BaseObjectStorage>,
    pub processing_queue: Arc<dyn BaseProcessingQueue>,
    /// Domain-event stream (status changes).
    pub events: Arc<dyn NatsPublisher>,
    pub notifications: Arc<dyn BaseNotificationService>,
    pub clock: Arc<dyn BaseClock>,
    pub settings: Arc<EngineSettings>,
    pub machine: StatusMachine,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        store: Arc<dyn BaseStore>,
        storage: Arc<dyn BaseObjectStorage>,
        processing_queue: Arc<dyn BaseProcessingQueue>,
        events: Arc<dyn NatsPublisher>,
        notifications: Arc<dyn BaseNotificationService>,
        clock: Arc<dyn BaseClock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            storage,
            processing_queue,
            events,
            notifications,
            clock,
            settings: Arc::new(settings),
            machine: StatusMachine::default(),
        }
    }
}
