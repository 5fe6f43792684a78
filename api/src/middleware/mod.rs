mod auth;

pub use auth::cron_auth_middleware;
