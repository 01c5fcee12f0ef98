use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Width of the `VARCHAR(255)` title and target columns, in characters.
pub const MAX_TITLE_CHARS: usize = 255;

// ---------------------------------------------------------------------------
// Text-backed enums
// ---------------------------------------------------------------------------

/// Implements the sqlx MySQL traits for an enum stored in a VARCHAR column,
/// delegating to its `as_str` / `FromStr` pair.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::MySql> for $ty {
            fn type_info() -> sqlx::mysql::MySqlTypeInfo {
                <str as sqlx::Type<sqlx::MySql>>::type_info()
            }

            fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::MySql>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::MySql> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<u8>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<'q, sqlx::MySql>>::encode_by_ref(&self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::MySql> for $ty {
            fn decode(
                value: sqlx::mysql::MySqlValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::MySql>>::decode(value)?;
                Ok(raw.parse()?)
            }
        }
    };
}

/// How often the tasks of a care plan recur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = FrequencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "custom" => Ok(Self::Custom),
            other => Err(FrequencyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Frequency`] string.
#[derive(Debug, Clone)]
pub struct FrequencyParseError(pub String);

impl fmt::Display for FrequencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid frequency: {:?} (expected daily, weekly, or custom)",
            self.0
        )
    }
}

impl std::error::Error for FrequencyParseError {}

text_column!(Frequency);

// ---------------------------------------------------------------------------

/// Status of a care plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(PlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] string.
#[derive(Debug, Clone)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid plan status: {:?} (expected active, completed, or cancelled)",
            self.0
        )
    }
}

impl std::error::Error for PlanStatusParseError {}

text_column!(PlanStatus);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A patient record. Owned outside the care plan domain; the store only
/// reads it to resolve seeding targets.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub stoma_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A care plan assigned to a patient for a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CarePlan {
    pub id: i64,
    pub patient_id: i64,
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub status: PlanStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One task within a care plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CarePlanItem {
    pub id: i64,
    pub plan_id: i64,
    pub title: String,
    pub description: String,
    /// Free-text quantity such as "每日2次".
    pub target_value: String,
    pub completed: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// A care plan joined with counts over its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CarePlanSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub plan: CarePlan,
    pub task_count: i64,
    pub completed_count: i64,
}

/// A care plan summary with its ordered items: what the clients load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub summary: CarePlanSummary,
    pub items: Vec<CarePlanItem>,
}

/// A patient education article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EducationArticle {
    pub id: i64,
    pub category: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
