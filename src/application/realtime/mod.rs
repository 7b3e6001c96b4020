//! Realtime synchronization core.
//!
//! - **connection_manager**: push-channel lifecycle, reconnect and teardown
//! - **subscription_registry**: topic ref counting and handler dispatch
//! - **cache_reconciler**: copy-on-write course cache and event merging
//! - **optimistic_mutator**: apply-then-confirm mutations with rollback
//! - **notification_store**: bounded notification ledger
//! - **transient_queue**: self-expiring UI events
//! - **sync**: wiring facade

pub mod cache_reconciler;
pub mod connection_manager;
pub mod notification_store;
pub mod optimistic_mutator;
pub mod subscription_registry;
pub mod sync;
pub mod transient_queue;

pub use cache_reconciler::{
    CacheReconciler, CacheUpdate, CourseCache, CourseSnapshot, OptimisticWrite, ReconcileOutcome,
    RollbackOutcome, UpdateSource,
};
pub use connection_manager::ConnectionManager;
pub use notification_store::{
    IngestOutcome, NotificationChange, NotificationSnapshot, NotificationStore,
};
pub use optimistic_mutator::{FnCommand, OptimisticCommand, OptimisticMutator, RollbackStatus};
pub use subscription_registry::{EventHandler, SubscriptionHandle, SubscriptionRegistry};
pub use sync::RealtimeSync;
pub use transient_queue::{PublishOutcome, TransientChange, TransientEventQueue};
