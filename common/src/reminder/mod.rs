// Staged event reminders: window matching, idempotent dispatch and accounting

pub mod dispatch;
pub mod engine;
pub mod guard;
pub mod memory;
pub mod metadata;
pub mod outcome;
pub mod resolver;
pub mod stage;
pub mod store;
pub mod window;

pub use engine::ReminderEngine;
pub use guard::{GuardDecision, IdempotencyGuard, SkipReason};
pub use memory::InMemoryReminderStore;
pub use outcome::{DispatchOutcome, EventReport, RunSummary};
pub use stage::{StageConfig, StageKind};
pub use store::{ClaimOutcome, DispatchLedger, ReminderStore};
pub use window::TimeWindow;
