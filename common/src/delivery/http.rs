// HTTP delivery adapter for a transactional email provider

use crate::config::DeliveryConfig;
use crate::delivery::{subject_for, DeliveryAdapter};
use crate::errors::DeliveryError;
use crate::models::{Event, Registration};
use crate::reminder::stage::StageConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Posts one JSON message per recipient to the provider endpoint
pub struct HttpDeliveryAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    from_address: String,
}

impl HttpDeliveryAdapter {
    /// Create a new adapter with the configured timeout
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                DeliveryError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: config.provider_url.clone(),
            api_key: config.api_key.clone(),
            from_address: config.from_address.clone(),
        })
    }

    fn build_message(&self, event: &Event, registration: &Registration, stage: &StageConfig) -> Value {
        json!({
            "from": self.from_address,
            "to": registration.email,
            "subject": subject_for(stage, &event.title),
            "template": stage.id(),
            "data": {
                "recipient_name": registration.name,
                "event_id": event.id,
                "event_title": event.title,
                "event_start": event.scheduled_start.to_rfc3339(),
                "stage": stage.id(),
            },
        })
    }
}

#[async_trait]
impl DeliveryAdapter for HttpDeliveryAdapter {
    #[instrument(skip_all, fields(event_id = %event.id, registration_id = %registration.id, stage = %stage.kind))]
    async fn send(
        &self,
        event: &Event,
        registration: &Registration,
        stage: &StageConfig,
    ) -> Result<bool, DeliveryError> {
        if registration.email.trim().is_empty() {
            return Err(DeliveryError::InvalidRecipient(format!(
                "registration {} has no email address",
                registration.id
            )));
        }

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.build_message(event, registration, stage));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(status = status.as_u16(), "Reminder accepted by provider");
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Reminder rejected by provider");
            Ok(false)
        }
    }
}
