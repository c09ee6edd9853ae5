//! Rental tier classification.

use rewind_core::config::{RentalConfig, TierTerms};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Age-based classification of a title, driving cost and rental window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rental_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RentalTier {
    /// Released within the last `recent_max_age_years`.
    Recent,
    /// Neither recent nor classic.
    Standard,
    /// At least `classic_min_age_years` old.
    Classic,
}

impl RentalTier {
    /// Classify a title by its age in `current_year`.
    ///
    /// Titles without a known release year are standard.
    pub fn classify(release_year: Option<i32>, current_year: i32, config: &RentalConfig) -> Self {
        let Some(year) = release_year else {
            return Self::Standard;
        };
        let age = current_year - year;
        if age < config.recent_max_age_years {
            Self::Recent
        } else if age >= config.classic_min_age_years {
            Self::Classic
        } else {
            Self::Standard
        }
    }

    /// Cost and duration for this tier.
    pub fn terms(&self, config: &RentalConfig) -> TierTerms {
        match self {
            Self::Recent => config.recent,
            Self::Standard => config.standard,
            Self::Classic => config.classic,
        }
    }

    /// Return the tier as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Standard => "standard",
            Self::Classic => "classic",
        }
    }
}

impl fmt::Display for RentalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
