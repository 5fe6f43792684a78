// Common library for shared code across the reminder API and scheduler

pub mod auth;
pub mod config;
pub mod db;
pub mod delivery;
pub mod errors;
pub mod models;
pub mod rate_limit;
pub mod reminder;
pub mod scheduler;
pub mod telemetry;
