//! Viewing mode and end reason enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the holder chose to watch. Set at most once per rental.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "viewing_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ViewingMode {
    /// No choice made yet.
    #[default]
    Unset,
    /// Streams inside the storefront.
    InStore,
    /// Full-file download, fetched out of band.
    TakeAway,
}

impl ViewingMode {
    /// Whether the holder has already chosen.
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Return the mode as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::InStore => "in_store",
            Self::TakeAway => "take_away",
        }
    }
}

impl fmt::Display for ViewingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Self::Unset),
            "in_store" => Ok(Self::InStore),
            "take_away" => Ok(Self::TakeAway),
            other => Err(format!("unknown viewing mode '{other}'")),
        }
    }
}

/// Why a rental stopped granting access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rental_end_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RentalEndReason {
    /// Retired by the expiry sweep.
    Expired,
    /// Handed back early by the holder.
    Returned,
    /// Ended by an operator.
    ForceEnded,
}

impl RentalEndReason {
    /// Return the reason as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Returned => "returned",
            Self::ForceEnded => "force_ended",
        }
    }
}

impl fmt::Display for RentalEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewing_mode_parse() {
        assert_eq!("in_store".parse::<ViewingMode>(), Ok(ViewingMode::InStore));
        assert_eq!("take_away".parse::<ViewingMode>(), Ok(ViewingMode::TakeAway));
        assert!("cinema".parse::<ViewingMode>().is_err());
        assert!(!ViewingMode::default().is_set());
    }
}
