// In-process reminder trigger: runs every stage on a fixed poll interval

use crate::config::SchedulerConfig;
use crate::reminder::ReminderEngine;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

/// Scheduler trait for periodic reminder runs
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the polling loop; returns once a shutdown signal arrives
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Signal the polling loop to stop after the current tick
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Run every configured stage once, returning the number of events processed
    async fn tick(&self) -> usize;
}

/// Drives `ReminderEngine::run_all` on an interval
pub struct ReminderScheduler {
    config: SchedulerConfig,
    engine: ReminderEngine,
    /// Latched stop flag; a stop requested before `start` is still seen
    shutdown_tx: watch::Sender<bool>,
}

impl ReminderScheduler {
    pub fn new(config: SchedulerConfig, engine: ReminderEngine) -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        Self {
            config,
            engine,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_seconds.max(1))
    }
}

#[async_trait]
impl Scheduler for ReminderScheduler {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            stages = self.engine.stages().len(),
            "Starting reminder scheduler"
        );

        let mut poll_interval = interval(self.poll_interval());
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_receiver();
        if *shutdown_rx.borrow_and_update() {
            info!("Reminder scheduler stopped before its first tick");
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let processed = self.tick().await;
                    if processed > 0 {
                        info!(events_processed = processed, "Reminder tick finished");
                    } else {
                        debug!("No reminders due");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow_and_update() {
                        info!("Shutdown signal received, stopping reminder scheduler");
                        break;
                    }
                }
            }
        }

        info!("Reminder scheduler stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping reminder scheduler");
        self.shutdown_tx.send_replace(true);
        Ok(())
    }

    async fn tick(&self) -> usize {
        let mut processed = 0;

        for (kind, result) in self.engine.run_all(Utc::now()).await {
            match result {
                Ok(summary) => processed += summary.events_processed,
                Err(e) => {
                    // A failed stage does not stop the others; the next tick retries it
                    error!(stage = %kind, error = %e, category = e.category(), "Reminder stage failed");
                }
            }
        }

        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemindersConfig;
    use crate::delivery::DeliveryAdapter;
    use crate::errors::DeliveryError;
    use crate::models::{Event, EventMetadata, Registration};
    use crate::rate_limit::NoPacing;
    use crate::reminder::{InMemoryReminderStore, StageConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct CountingAdapter(AtomicUsize);

    #[async_trait]
    impl DeliveryAdapter for CountingAdapter {
        async fn send(
            &self,
            _event: &Event,
            _registration: &Registration,
            _stage: &StageConfig,
        ) -> Result<bool, DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn scheduler(store: Arc<InMemoryReminderStore>, adapter: Arc<CountingAdapter>) -> ReminderScheduler {
        let engine = ReminderEngine::from_config(
            &RemindersConfig::default(),
            store.clone(),
            store,
            adapter,
            Arc::new(NoPacing),
        )
        .unwrap();
        ReminderScheduler::new(
            SchedulerConfig {
                enabled: true,
                poll_interval_seconds: 60,
            },
            engine,
        )
    }

    #[tokio::test]
    async fn test_tick_runs_due_stage_once() {
        let store = Arc::new(InMemoryReminderStore::new());
        let event = Event {
            id: Uuid::new_v4(),
            title: "Async in practice".to_string(),
            scheduled_start: Utc::now() + chrono::Duration::minutes(30),
            is_active: true,
            metadata: EventMetadata::new(),
        };
        store.insert_event(event.clone()).await;
        store
            .insert_registration(Registration {
                id: Uuid::new_v4(),
                event_id: event.id,
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                confirmed: true,
                created_at: Utc::now(),
            })
            .await;

        let adapter = Arc::new(CountingAdapter(AtomicUsize::new(0)));
        let scheduler = scheduler(store, adapter.clone());

        assert_eq!(scheduler.tick().await, 1);
        assert_eq!(adapter.0.load(Ordering::SeqCst), 1);

        // Same day, same stage: already flagged
        assert_eq!(scheduler.tick().await, 0);
        assert_eq!(adapter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_returns_after_stop() {
        let store = Arc::new(InMemoryReminderStore::new());
        let adapter = Arc::new(CountingAdapter(AtomicUsize::new(0)));
        let scheduler = Arc::new(scheduler(store, adapter));

        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start().await.is_ok() })
        };

        tokio::task::yield_now().await;
        scheduler.stop().await.unwrap();

        let stopped = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_not_lost() {
        let store = Arc::new(InMemoryReminderStore::new());
        let adapter = Arc::new(CountingAdapter(AtomicUsize::new(0)));
        let scheduler = scheduler(store, adapter.clone());

        scheduler.stop().await.unwrap();
        assert!(scheduler.is_stopping());

        let result = tokio::time::timeout(Duration::from_secs(5), scheduler.start())
            .await
            .expect("scheduler ignored an earlier stop");
        assert!(result.is_ok());
        assert_eq!(adapter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let store = Arc::new(InMemoryReminderStore::new());
        let adapter = Arc::new(CountingAdapter(AtomicUsize::new(0)));
        let mut scheduler = scheduler(store, adapter);
        scheduler.config.poll_interval_seconds = 0;
        assert_eq!(scheduler.poll_interval(), Duration::from_secs(1));
    }
}
