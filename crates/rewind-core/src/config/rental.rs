//! Rental pricing, duration, and reward configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest rental window accepted from configuration (ten years).
pub const MAX_DURATION_HOURS: i64 = 24 * 365 * 10;

/// Longest orphan grace window accepted from configuration (one day).
pub const MAX_ORPHAN_GRACE_SECONDS: i64 = 24 * 60 * 60;

/// Cost and rental window for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTerms {
    /// Credits debited on admission.
    pub cost: i64,
    /// Hours from admission until the rental expires.
    pub duration_hours: i64,
}

impl TierTerms {
    fn validate(&self, tier: &str) -> Result<(), AppError> {
        if self.cost < 0 {
            return Err(AppError::configuration(format!(
                "rental.{tier}.cost must not be negative, got {}",
                self.cost
            )));
        }
        if !(1..=MAX_DURATION_HOURS).contains(&self.duration_hours) {
            return Err(AppError::configuration(format!(
                "rental.{tier}.duration_hours must be between 1 and {MAX_DURATION_HOURS}, got {}",
                self.duration_hours
            )));
        }
        Ok(())
    }
}

/// Rental configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalConfig {
    /// Terms for titles younger than `recent_max_age_years`.
    #[serde(default = "default_recent")]
    pub recent: TierTerms,
    /// Terms for everything between recent and classic.
    #[serde(default = "default_standard")]
    pub standard: TierTerms,
    /// Terms for titles at least `classic_min_age_years` old.
    #[serde(default = "default_classic")]
    pub classic: TierTerms,
    /// Titles strictly younger than this many years are recent.
    #[serde(default = "default_recent_max_age")]
    pub recent_max_age_years: i32,
    /// Titles at least this many years old are classics.
    #[serde(default = "default_classic_min_age")]
    pub classic_min_age_years: i32,
    /// Watch progress needed before the rewind reward can be claimed.
    #[serde(default = "default_rewind_threshold")]
    pub rewind_threshold_percent: i16,
    /// Credits granted by the rewind reward.
    #[serde(default = "default_rewind_reward")]
    pub rewind_reward_credits: i64,
    /// Access points younger than this are never treated as orphans; an
    /// admission may still be committing them.
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_seconds: i64,
}

impl RentalConfig {
    /// Reject values the rental engine cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        self.recent.validate("recent")?;
        self.standard.validate("standard")?;
        self.classic.validate("classic")?;

        if self.recent_max_age_years < 0 {
            return Err(AppError::configuration(
                "rental.recent_max_age_years must not be negative",
            ));
        }
        if self.classic_min_age_years < self.recent_max_age_years {
            return Err(AppError::configuration(format!(
                "rental.classic_min_age_years ({}) must not be below recent_max_age_years ({})",
                self.classic_min_age_years, self.recent_max_age_years
            )));
        }
        if !(0..=100).contains(&self.rewind_threshold_percent) {
            return Err(AppError::configuration(format!(
                "rental.rewind_threshold_percent must be between 0 and 100, got {}",
                self.rewind_threshold_percent
            )));
        }
        if self.rewind_reward_credits < 0 {
            return Err(AppError::configuration(
                "rental.rewind_reward_credits must not be negative",
            ));
        }
        if !(0..=MAX_ORPHAN_GRACE_SECONDS).contains(&self.orphan_grace_seconds) {
            return Err(AppError::configuration(format!(
                "rental.orphan_grace_seconds must be between 0 and {MAX_ORPHAN_GRACE_SECONDS}, got {}",
                self.orphan_grace_seconds
            )));
        }
        Ok(())
    }

    /// Grace window as a duration.
    pub fn orphan_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.orphan_grace_seconds.clamp(0, MAX_ORPHAN_GRACE_SECONDS))
    }
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            recent: default_recent(),
            standard: default_standard(),
            classic: default_classic(),
            recent_max_age_years: default_recent_max_age(),
            classic_min_age_years: default_classic_min_age(),
            rewind_threshold_percent: default_rewind_threshold(),
            rewind_reward_credits: default_rewind_reward(),
            orphan_grace_seconds: default_orphan_grace(),
        }
    }
}

fn default_recent() -> TierTerms {
    TierTerms {
        cost: 2,
        duration_hours: 48,
    }
}

fn default_standard() -> TierTerms {
    TierTerms {
        cost: 1,
        duration_hours: 72,
    }
}

fn default_classic() -> TierTerms {
    TierTerms {
        cost: 1,
        duration_hours: 168,
    }
}

fn default_recent_max_age() -> i32 {
    1
}

fn default_classic_min_age() -> i32 {
    25
}

fn default_rewind_threshold() -> i16 {
    90
}

fn default_rewind_reward() -> i64 {
    1
}

fn default_orphan_grace() -> i64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults_are_valid() {
        RentalConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_unusable_tier_terms() {
        let cases = [
            TierTerms {
                cost: -1,
                duration_hours: 48,
            },
            TierTerms {
                cost: 1,
                duration_hours: 0,
            },
            TierTerms {
                cost: 1,
                duration_hours: -24,
            },
            TierTerms {
                cost: 1,
                duration_hours: i64::MAX,
            },
        ];
        for terms in cases {
            let config = RentalConfig {
                standard: terms,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind, ErrorKind::Configuration, "{terms:?}");
            assert!(err.message.contains("rental.standard"), "{}", err.message);
        }
    }

    #[test]
    fn test_rejects_out_of_range_reward_settings() {
        for config in [
            RentalConfig {
                rewind_threshold_percent: 101,
                ..Default::default()
            },
            RentalConfig {
                rewind_threshold_percent: -5,
                ..Default::default()
            },
            RentalConfig {
                rewind_reward_credits: -1,
                ..Default::default()
            },
            RentalConfig {
                classic_min_age_years: 0,
                recent_max_age_years: 2,
                ..Default::default()
            },
            RentalConfig {
                orphan_grace_seconds: -1,
                ..Default::default()
            },
        ] {
            assert_eq!(
                config.validate().unwrap_err().kind,
                ErrorKind::Configuration
            );
        }
    }

    #[test]
    fn test_boundaries_are_accepted() {
        let config = RentalConfig {
            recent: TierTerms {
                cost: 0,
                duration_hours: MAX_DURATION_HOURS,
            },
            rewind_threshold_percent: 100,
            rewind_reward_credits: 0,
            orphan_grace_seconds: 0,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.orphan_grace(), chrono::Duration::zero());
    }
}
