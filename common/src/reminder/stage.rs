// Reminder stage definitions

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The reminder stages a webinar goes through before it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    /// Several hours ahead
    FarLead,
    /// A couple of hours ahead
    MidRange,
    /// Shortly before the start
    NearLead,
    /// "Starting now"
    AtStart,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::FarLead,
        StageKind::MidRange,
        StageKind::NearLead,
        StageKind::AtStart,
    ];

    /// Stable identifier used in ledger keys, routes and metric labels
    pub fn id(&self) -> &'static str {
        match self {
            StageKind::FarLead => "far-lead",
            StageKind::MidRange => "mid-range",
            StageKind::NearLead => "near-lead",
            StageKind::AtStart => "at-start",
        }
    }

    /// Built-in lead time and tolerance for this stage
    pub fn default_config(&self) -> StageConfig {
        match self {
            StageKind::FarLead => StageConfig::from_minutes(*self, 300, 30),
            StageKind::MidRange => StageConfig::from_minutes(*self, 120, 15),
            StageKind::NearLead => StageConfig::from_minutes(*self, 30, 5),
            StageKind::AtStart => StageConfig::from_minutes(*self, 0, 5),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| format!("unknown reminder stage '{}'", s))
    }
}

/// Lead time and matching tolerance for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageConfig {
    pub kind: StageKind,
    /// How long before the event start this stage targets
    pub lead: Duration,
    /// Half-width of the acceptance window around `now + lead`
    pub tolerance: Duration,
}

impl StageConfig {
    pub fn new(kind: StageKind, lead: Duration, tolerance: Duration) -> Self {
        Self {
            kind,
            lead,
            tolerance,
        }
    }

    pub fn from_minutes(kind: StageKind, lead_minutes: i64, tolerance_minutes: i64) -> Self {
        Self::new(
            kind,
            Duration::minutes(lead_minutes),
            Duration::minutes(tolerance_minutes),
        )
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    /// Metadata key holding the time of the last completed pass of this stage
    pub fn last_sent_key(&self) -> String {
        format!("{}:last_sent_at", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ids_round_trip() {
        for kind in StageKind::ALL {
            assert_eq!(kind.id().parse::<StageKind>().unwrap(), kind);
        }
        assert!("five-hours".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_far_lead_defaults() {
        let config = StageKind::FarLead.default_config();
        assert_eq!(config.lead, Duration::minutes(300));
        assert_eq!(config.tolerance, Duration::minutes(30));
    }

    #[test]
    fn test_at_start_has_zero_lead() {
        let config = StageKind::AtStart.default_config();
        assert_eq!(config.lead, Duration::zero());
        assert!(config.tolerance > Duration::zero());
    }

    #[test]
    fn test_serde_uses_kebab_case() {
        let json = serde_json::to_string(&StageKind::NearLead).unwrap();
        assert_eq!(json, "\"near-lead\"");
        let kind: StageKind = serde_json::from_str("\"mid-range\"").unwrap();
        assert_eq!(kind, StageKind::MidRange);
    }

    #[test]
    fn test_last_sent_key_is_scoped_by_stage() {
        let config = StageKind::AtStart.default_config();
        assert_eq!(config.last_sent_key(), "at-start:last_sent_at");
    }
}
