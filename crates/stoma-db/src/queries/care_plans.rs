//! Database query functions for the `care_plans` table.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;

use crate::error::StoreError;
use crate::models::{
    CarePlan, CarePlanSummary, Frequency, MAX_TITLE_CHARS, PlanDetail, PlanStatus,
};
use crate::queries::care_plan_items;

/// Fields for a new care plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCarePlan {
    pub title: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub status: PlanStatus,
    pub notes: String,
}

impl NewCarePlan {
    /// Check the invariants the store enforces on every write.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::validation("care plan title must not be empty"));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(StoreError::validation(format!(
                "care plan title is longer than {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.end_date < self.start_date {
            return Err(StoreError::validation(format!(
                "end date {} is before start date {}",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }
}

/// Unparsed care plan fields as they arrive from the API or the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCarePlan {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub frequency: String,
    /// Defaults to `active` when omitted.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl TryFrom<RawCarePlan> for NewCarePlan {
    type Error = StoreError;

    fn try_from(raw: RawCarePlan) -> Result<Self, Self::Error> {
        let start_date = parse_date("start date", &raw.start_date)?;
        let end_date = parse_date("end date", &raw.end_date)?;
        let frequency: Frequency = raw.frequency.trim().parse()?;
        let status = match raw.status.as_deref().map(str::trim) {
            None | Some("") => PlanStatus::Active,
            Some(s) => s.parse()?,
        };

        let plan = Self {
            title: raw.title,
            description: raw.description,
            start_date,
            end_date,
            frequency,
            status,
            notes: raw.notes,
        };
        plan.validate()?;
        Ok(plan)
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        StoreError::validation(format!("invalid {field} {value:?}: {e} (expected YYYY-MM-DD)"))
    })
}

/// Insert a new care plan for `patient_id` and return its assigned id.
///
/// Nothing is written when the fields fail validation.
pub async fn create_plan(
    pool: &MySqlPool,
    patient_id: i64,
    plan: &NewCarePlan,
) -> Result<i64, StoreError> {
    plan.validate()?;

    let result = sqlx::query(
        "INSERT INTO care_plans \
         (patient_id, title, description, start_date, end_date, frequency, status, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(patient_id)
    .bind(&plan.title)
    .bind(&plan.description)
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.frequency)
    .bind(plan.status)
    .bind(&plan.notes)
    .execute(pool)
    .await?;

    let plan_id = result.last_insert_id() as i64;
    info!(plan_id, patient_id, title = %plan.title, "care plan created");
    Ok(plan_id)
}

/// Fetch a care plan by id.
pub async fn get_plan(pool: &MySqlPool, id: i64) -> Result<Option<CarePlan>, StoreError> {
    let plan = sqlx::query_as::<_, CarePlan>("SELECT * FROM care_plans WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(plan)
}

/// Fetch a care plan together with the number of items it owns.
///
/// A plan without items reports a count of zero.
pub async fn get_plan_with_item_count(
    pool: &MySqlPool,
    id: i64,
) -> Result<CarePlanSummary, StoreError> {
    let summary = sqlx::query_as::<_, CarePlanSummary>(
        "SELECT cp.*, \
                COUNT(i.id) AS task_count, \
                CAST(COALESCE(SUM(i.completed), 0) AS SIGNED) AS completed_count \
         FROM care_plans cp \
         LEFT JOIN care_plan_items i ON i.plan_id = cp.id \
         WHERE cp.id = ? \
         GROUP BY cp.id",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    summary.ok_or_else(|| StoreError::not_found("care plan", id))
}

/// The active plan of a patient.
///
/// Nothing in the schema prevents several active plans per patient; the
/// lowest id (earliest inserted) wins.
pub async fn find_active_plan(
    pool: &MySqlPool,
    patient_id: i64,
) -> Result<Option<CarePlan>, StoreError> {
    let plan = sqlx::query_as::<_, CarePlan>(
        "SELECT * FROM care_plans \
         WHERE patient_id = ? AND status = 'active' \
         ORDER BY id ASC \
         LIMIT 1",
    )
    .bind(patient_id)
    .fetch_optional(pool)
    .await?;

    Ok(plan)
}

/// List every plan of a patient, oldest first.
pub async fn list_plans_for_patient(
    pool: &MySqlPool,
    patient_id: i64,
) -> Result<Vec<CarePlan>, StoreError> {
    let plans = sqlx::query_as::<_, CarePlan>(
        "SELECT * FROM care_plans WHERE patient_id = ? ORDER BY id ASC",
    )
    .bind(patient_id)
    .fetch_all(pool)
    .await?;

    Ok(plans)
}

/// Update the status of a plan.
pub async fn update_plan_status(
    pool: &MySqlPool,
    id: i64,
    status: PlanStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE care_plans SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;

    // MySQL reports zero affected rows when the value is unchanged, so
    // distinguish "not found" from "already in that status".
    if result.rows_affected() == 0 && get_plan(pool, id).await?.is_none() {
        return Err(StoreError::not_found("care plan", id));
    }

    info!(plan_id = id, %status, "care plan status updated");
    Ok(())
}

/// Fetch a plan summary with its ordered items.
pub async fn get_plan_detail(pool: &MySqlPool, id: i64) -> Result<PlanDetail, StoreError> {
    let summary = get_plan_with_item_count(pool, id).await?;
    let items = care_plan_items::list_items(pool, id).await?;
    Ok(PlanDetail { summary, items })
}

/// Detail of the active plan of a patient, if there is one.
pub async fn active_plan_detail(
    pool: &MySqlPool,
    patient_id: i64,
) -> Result<Option<PlanDetail>, StoreError> {
    match find_active_plan(pool, patient_id).await? {
        Some(plan) => Ok(Some(get_plan_detail(pool, plan.id).await?)),
        None => Ok(None),
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
