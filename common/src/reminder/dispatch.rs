// Sequential dispatch loop over an event's recipients

use crate::delivery::DeliveryAdapter;
use crate::models::{Event, Registration};
use crate::rate_limit::SendPacer;
use crate::reminder::outcome::DispatchOutcome;
use crate::reminder::stage::StageConfig;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Sends one reminder per recipient, in order, one at a time
///
/// A failed recipient is counted and logged, then the loop moves on. Nothing
/// is retried, in this run or any later one.
#[derive(Clone)]
pub struct DispatchLoop {
    adapter: Arc<dyn DeliveryAdapter>,
    pacer: Arc<dyn SendPacer>,
}

impl DispatchLoop {
    pub fn new(adapter: Arc<dyn DeliveryAdapter>, pacer: Arc<dyn SendPacer>) -> Self {
        Self { adapter, pacer }
    }

    #[instrument(skip_all, fields(event_id = %event.id, stage = %stage.kind, recipients = recipients.len()))]
    pub async fn run(
        &self,
        event: &Event,
        stage: &StageConfig,
        recipients: &[Registration],
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome {
            recipients_total: recipients.len(),
            ..Default::default()
        };

        for registration in recipients {
            self.pacer.ready().await;

            match self.adapter.send(event, registration, stage).await {
                Ok(true) => {
                    outcome.record_sent();
                    debug!(registration_id = %registration.id, "Reminder sent");
                }
                Ok(false) => {
                    outcome.record_failed();
                    warn!(
                        registration_id = %registration.id,
                        "Reminder not accepted by delivery adapter"
                    );
                }
                Err(e) => {
                    outcome.record_failed();
                    warn!(
                        registration_id = %registration.id,
                        error = %e,
                        "Reminder delivery failed"
                    );
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DeliveryError;
    use crate::models::EventMetadata;
    use crate::rate_limit::NoPacing;
    use crate::reminder::stage::StageKind;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::predicate::always;
    use mockall::Sequence;
    use uuid::Uuid;

    mockall::mock! {
        pub Adapter {}

        #[async_trait]
        impl DeliveryAdapter for Adapter {
            async fn send(
                &self,
                event: &Event,
                registration: &Registration,
                stage: &StageConfig,
            ) -> Result<bool, DeliveryError>;
        }
    }

    fn event() -> Event {
        Event {
            id: Uuid::new_v4(),
            title: "Unsafe Rust".to_string(),
            scheduled_start: Utc::now(),
            is_active: true,
            metadata: EventMetadata::new(),
        }
    }

    fn recipients(event: &Event, count: usize) -> Vec<Registration> {
        (0..count)
            .map(|i| Registration {
                id: Uuid::new_v4(),
                event_id: event.id,
                email: format!("learner{}@example.com", i),
                name: None,
                confirmed: true,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_successful_sends() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_send()
            .times(3)
            .returning(|_, _, _| Ok(true));

        let dispatch = DispatchLoop::new(Arc::new(adapter), Arc::new(NoPacing));
        let event = event();
        let outcome = dispatch
            .run(&event, &StageKind::FarLead.default_config(), &recipients(&event, 3))
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome {
                recipients_total: 3,
                sent: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_batch_continues() {
        let event = event();
        let list = recipients(&event, 5);
        let failing = [list[1].email.clone(), list[3].email.clone()];

        let mut adapter = MockAdapter::new();
        adapter
            .expect_send()
            .times(5)
            .returning(move |_, registration, _| {
                if registration.email == failing[0] {
                    Err(DeliveryError::RequestFailed("connection reset".to_string()))
                } else if registration.email == failing[1] {
                    Ok(false)
                } else {
                    Ok(true)
                }
            });

        let dispatch = DispatchLoop::new(Arc::new(adapter), Arc::new(NoPacing));
        let outcome = dispatch
            .run(&event, &StageKind::NearLead.default_config(), &list)
            .await;

        assert_eq!(outcome.recipients_total, 5);
        assert_eq!(outcome.sent, 3);
        assert_eq!(outcome.failed, 2);
    }

    #[tokio::test]
    async fn test_recipients_are_sent_in_order() {
        let event = event();
        let list = recipients(&event, 3);
        let mut seq = Sequence::new();
        let mut adapter = MockAdapter::new();
        for registration in &list {
            let expected = registration.id;
            adapter
                .expect_send()
                .with(always(), mockall::predicate::function(move |r: &Registration| r.id == expected), always())
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(true));
        }

        let dispatch = DispatchLoop::new(Arc::new(adapter), Arc::new(NoPacing));
        let outcome = dispatch
            .run(&event, &StageKind::AtStart.default_config(), &list)
            .await;
        assert_eq!(outcome.sent, 3);
    }

    #[tokio::test]
    async fn test_no_recipients_sends_nothing() {
        let mut adapter = MockAdapter::new();
        adapter.expect_send().never();

        let dispatch = DispatchLoop::new(Arc::new(adapter), Arc::new(NoPacing));
        let event = event();
        let outcome = dispatch
            .run(&event, &StageKind::MidRange.default_config(), &[])
            .await;
        assert_eq!(outcome, DispatchOutcome::default());
    }
}
