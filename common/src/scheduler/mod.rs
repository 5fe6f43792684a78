// Periodic in-process trigger for reminder stages

pub mod engine;

pub use engine::{ReminderScheduler, Scheduler};
