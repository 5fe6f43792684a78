// Delivery adapters: one notification to one recipient

pub mod http;

pub use http::HttpDeliveryAdapter;

use crate::errors::DeliveryError;
use crate::models::{Event, Registration};
use crate::reminder::stage::StageConfig;
use async_trait::async_trait;

/// Sends one reminder to one registration
///
/// `Ok(false)` and `Err(_)` are both counted as a failed send by the
/// dispatch loop; the distinction only matters for logging.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn send(
        &self,
        event: &Event,
        registration: &Registration,
        stage: &StageConfig,
    ) -> Result<bool, DeliveryError>;
}

/// Human-readable subject line for a stage's reminder
pub fn subject_for(stage: &StageConfig, title: &str) -> String {
    let minutes = stage.lead.num_minutes();
    if minutes <= 0 {
        format!("{} is starting now", title)
    } else if minutes % 60 == 0 {
        let hours = minutes / 60;
        let unit = if hours == 1 { "hour" } else { "hours" };
        format!("Reminder: {} starts in {} {}", title, hours, unit)
    } else {
        format!("Reminder: {} starts in {} minutes", title, minutes)
    }
}
