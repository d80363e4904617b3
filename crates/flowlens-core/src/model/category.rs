//! Lifecycle vocabulary shared by every flow metric.
//!
//! A work item moves through ordered [`StateCategory`] phases. Each state
//! inside a phase is either waiting ([`StateType::Queue`]) or value-adding
//! ([`StateType::Active`]). A reporting [`Period`] selects which phase a
//! metric looks at, which timestamp anchors it, and which age it reports:
//!
//! | Period  | anchor field     | category   | age field                 |
//! |---------|------------------|------------|---------------------------|
//! | past    | `departureDate`  | completed  | `leadTimeInWholeDays`     |
//! | present | `commitmentDate` | inprogress | `wipAgeInWholeDays`       |
//! | future  | `arrivalDate`    | proposed   | `inventoryAgeInWholeDays` |

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// Lifecycle phase of a work item, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateCategory {
    Preceding,
    Proposed,
    InProgress,
    Completed,
    Removed,
}

impl StateCategory {
    /// Every category in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Preceding,
        Self::Proposed,
        Self::InProgress,
        Self::Completed,
        Self::Removed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preceding => "preceding",
            Self::Proposed => "proposed",
            Self::InProgress => "inprogress",
            Self::Completed => "completed",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preceding" => Ok(Self::Preceding),
            "proposed" => Ok(Self::Proposed),
            "inprogress" | "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "removed" => Ok(Self::Removed),
            _ => Err(ParseEnumError {
                expected: "state category",
                got: s.to_string(),
            }),
        }
    }
}

/// Whether time in a state counts as waiting or as value-adding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Queue,
    Active,
}

impl StateType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "active" => Ok(Self::Active),
            _ => Err(ParseEnumError {
                expected: "state type",
                got: s.to_string(),
            }),
        }
    }
}

/// Reporting period: completed work, work in progress, or upcoming work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Past,
    Present,
    Future,
}

impl Period {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Past => "past",
            Self::Present => "present",
            Self::Future => "future",
        }
    }

    /// The work item timestamp that anchors this period.
    #[must_use]
    pub const fn period_field(self) -> PeriodField {
        match self {
            Self::Past => PeriodField::DepartureDate,
            Self::Present => PeriodField::CommitmentDate,
            Self::Future => PeriodField::ArrivalDate,
        }
    }

    /// The lifecycle phase whose items make up this period's population.
    #[must_use]
    pub const fn state_category(self) -> StateCategory {
        match self {
            Self::Past => StateCategory::Completed,
            Self::Present => StateCategory::InProgress,
            Self::Future => StateCategory::Proposed,
        }
    }

    /// The age metric reported for this period.
    #[must_use]
    pub const fn age_field(self) -> AgeField {
        match self {
            Self::Past => AgeField::LeadTimeInWholeDays,
            Self::Present => AgeField::WipAgeInWholeDays,
            Self::Future => AgeField::InventoryAgeInWholeDays,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "past" => Ok(Self::Past),
            "present" => Ok(Self::Present),
            "future" => Ok(Self::Future),
            _ => Err(ParseEnumError {
                expected: "period",
                got: s.to_string(),
            }),
        }
    }
}

/// Work item timestamp columns addressable by period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodField {
    ArrivalDate,
    CommitmentDate,
    DepartureDate,
}

impl PeriodField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArrivalDate => "arrivalDate",
            Self::CommitmentDate => "commitmentDate",
            Self::DepartureDate => "departureDate",
        }
    }

    /// Column name in the snapshot store.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::ArrivalDate => "arrival_date_us",
            Self::CommitmentDate => "commitment_date_us",
            Self::DepartureDate => "departure_date_us",
        }
    }
}

impl fmt::Display for PeriodField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-day age metrics, one per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeField {
    LeadTimeInWholeDays,
    WipAgeInWholeDays,
    InventoryAgeInWholeDays,
}

impl AgeField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LeadTimeInWholeDays => "leadTimeInWholeDays",
            Self::WipAgeInWholeDays => "wipAgeInWholeDays",
            Self::InventoryAgeInWholeDays => "inventoryAgeInWholeDays",
        }
    }
}

impl fmt::Display for AgeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_lookup_tables() {
        assert_eq!(Period::Past.period_field().as_str(), "departureDate");
        assert_eq!(Period::Present.period_field().as_str(), "commitmentDate");
        assert_eq!(Period::Future.period_field().as_str(), "arrivalDate");

        assert_eq!(Period::Past.state_category(), StateCategory::Completed);
        assert_eq!(Period::Present.state_category(), StateCategory::InProgress);
        assert_eq!(Period::Future.state_category(), StateCategory::Proposed);

        assert_eq!(Period::Past.age_field().as_str(), "leadTimeInWholeDays");
        assert_eq!(Period::Present.age_field().as_str(), "wipAgeInWholeDays");
        assert_eq!(
            Period::Future.age_field().as_str(),
            "inventoryAgeInWholeDays"
        );
    }

    #[test]
    fn categories_follow_lifecycle_order() {
        let mut shuffled = vec![
            StateCategory::Removed,
            StateCategory::Proposed,
            StateCategory::Completed,
            StateCategory::Preceding,
            StateCategory::InProgress,
        ];
        shuffled.sort();
        assert_eq!(shuffled, StateCategory::ALL.to_vec());
    }

    #[test]
    fn parse_round_trips_tokens() {
        for category in StateCategory::ALL {
            assert_eq!(category.as_str().parse::<StateCategory>(), Ok(category));
        }
        assert_eq!("Active".parse::<StateType>(), Ok(StateType::Active));
        assert_eq!(" queue ".parse::<StateType>(), Ok(StateType::Queue));
        assert_eq!("in-progress".parse(), Ok(StateCategory::InProgress));
    }

    #[test]
    fn parse_rejects_unknown_tokens() {
        let err = "blocked".parse::<StateType>().unwrap_err();
        assert_eq!(err.expected, "state type");
        assert_eq!(err.to_string(), "invalid state type: 'blocked'");
        assert!("someday".parse::<Period>().is_err());
    }
}
