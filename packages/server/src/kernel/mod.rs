//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod nats;
pub mod notifications;
pub mod scheduled_tasks;
pub mod storage;
pub mod store;
pub mod test_dependencies;
pub mod traits;
pub mod unit_of_work;

pub use deps::ServerDeps;
pub use nats::{
    NatsClientPublisher, NatsProcessingQueue, NatsPublisher, PublishedMessage, TestNats,
    PROCESSING_JOBS_SUBJECT,
};
pub use notifications::{LogNotifier, WebhookNotifier};
pub use scheduled_tasks::start_scheduler;
pub use storage::SignedUrlStorage;
pub use store::{BaseStore, MemoryState, MemoryStore, PostgresStore, StoreTx};
pub use test_dependencies::{
    FixedClock, MockObjectStorage, SlotFixture, SpyNotifier, SpyProcessingQueue, TestDependencies,
};
pub use traits::*;
pub use unit_of_work::{PostCommit, SideEffect, UnitOfWork};
