// Window matching: which events a stage is due for right now

use crate::errors::ReminderError;
use crate::models::Event;
use crate::reminder::stage::StageConfig;
use crate::reminder::store::ReminderStore;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Inclusive range of event start times a stage accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// `[now + lead - tolerance, now + lead + tolerance]`
    ///
    /// Fails instead of panicking when the bounds fall outside the
    /// representable time range.
    pub fn due(now: DateTime<Utc>, stage: &StageConfig) -> Result<Self, ReminderError> {
        let out_of_range = || {
            ReminderError::InvalidStage(format!(
                "window for stage '{}' is out of range (lead {}m, tolerance {}m)",
                stage.kind,
                stage.lead.num_minutes(),
                stage.tolerance.num_minutes()
            ))
        };
        let center = now.checked_add_signed(stage.lead).ok_or_else(out_of_range)?;
        Ok(Self {
            start: center
                .checked_sub_signed(stage.tolerance)
                .ok_or_else(out_of_range)?,
            end: center
                .checked_add_signed(stage.tolerance)
                .ok_or_else(out_of_range)?,
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Active events whose start falls inside the stage's current window
#[instrument(skip(store), fields(stage = %stage.kind))]
pub async fn find_due_events(
    store: &dyn ReminderStore,
    stage: &StageConfig,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, ReminderError> {
    let window = TimeWindow::due(now, stage)?;
    let events = store
        .find_events_in_range(window.start, window.end, true)
        .await?;

    debug!(
        window_start = %window.start,
        window_end = %window.end,
        count = events.len(),
        "Matched events in stage window"
    );

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::stage::StageKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_far_lead_window_bounds() {
        let stage = StageKind::FarLead.default_config();
        let window = TimeWindow::due(fixed_now(), &stage).unwrap();
        assert_eq!(window.start, fixed_now() + Duration::minutes(270));
        assert_eq!(window.end, fixed_now() + Duration::minutes(330));
    }

    #[test]
    fn test_at_start_window_straddles_now() {
        let stage = StageKind::AtStart.default_config();
        let window = TimeWindow::due(fixed_now(), &stage).unwrap();
        assert!(window.contains(fixed_now()));
        assert!(window.contains(fixed_now() - Duration::minutes(5)));
        assert!(!window.contains(fixed_now() - Duration::minutes(6)));
    }

    #[test]
    fn test_overflowing_lead_is_an_error_not_a_panic() {
        let stage = StageConfig::from_minutes(StageKind::FarLead, 1_000_000_000_000, 30);
        let result = TimeWindow::due(fixed_now(), &stage);
        assert!(matches!(result, Err(ReminderError::InvalidStage(_))));
    }

    #[test]
    fn test_overflowing_tolerance_is_an_error_not_a_panic() {
        let stage = StageConfig::new(StageKind::AtStart, Duration::zero(), Duration::MAX);
        let result = TimeWindow::due(fixed_now(), &stage);
        assert!(matches!(result, Err(ReminderError::InvalidStage(_))));
    }

    proptest! {
        #[test]
        fn prop_window_bounds_are_inclusive(
            lead in 0i64..1440,
            tolerance in 0i64..120,
            offset in -120i64..120,
        ) {
            let stage = StageConfig::from_minutes(StageKind::MidRange, lead, tolerance);
            let now = fixed_now();
            let window = TimeWindow::due(now, &stage).unwrap();
            let start = now + Duration::minutes(lead + offset);
            prop_assert_eq!(window.contains(start), offset.abs() <= tolerance);
        }

        #[test]
        fn prop_just_past_the_edge_is_excluded(
            lead in 0i64..1440,
            tolerance in 0i64..120,
            epsilon_ms in 1i64..60_000,
        ) {
            let stage = StageConfig::from_minutes(StageKind::NearLead, lead, tolerance);
            let now = fixed_now();
            let window = TimeWindow::due(now, &stage).unwrap();
            let edge = now + stage.lead + stage.tolerance;
            prop_assert!(window.contains(edge));
            prop_assert!(!window.contains(edge + Duration::milliseconds(epsilon_ms)));
            let low_edge = now + stage.lead - stage.tolerance;
            prop_assert!(window.contains(low_edge));
            prop_assert!(!window.contains(low_edge - Duration::milliseconds(epsilon_ms)));
        }
    }
}
