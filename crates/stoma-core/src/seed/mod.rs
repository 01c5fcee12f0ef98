//! Idempotent demo-data seeding.
//!
//! Brings a patient's active care plan to the demo state: one active plan
//! titled [`template::DEMO_PLAN_TITLE`] holding the fixed task list. Running
//! the seeder again reuses the plan and rewrites its items, so N runs leave
//! the same state as one.

pub mod template;

use std::fmt;

use chrono::{FixedOffset, NaiveDate, Utc};
use sqlx::MySqlPool;
use tracing::{debug, info};

use stoma_db::error::StoreError;
use stoma_db::models::{Patient, PlanStatus};
use stoma_db::queries::{care_plan_items, care_plans, patients};

/// Errors that can occur while seeding.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("no patient found; create a patient before seeding")]
    NoPatient,

    #[error("patient {0} not found")]
    PatientNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the seeder did, for operator confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub patient_id: i64,
    pub patient_name: String,
    pub plan_id: i64,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PlanStatus,
    pub item_count: i64,
    /// `false` when an existing active plan was reused.
    pub created: bool,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = if self.created { "created" } else { "refreshed" };
        writeln!(
            f,
            "Care plan {} {action} for patient {} ({})",
            self.plan_id, self.patient_id, self.patient_name
        )?;
        writeln!(f, "  Title:  {}", self.title)?;
        writeln!(f, "  Period: {} .. {}", self.start_date, self.end_date)?;
        writeln!(f, "  Status: {}", self.status)?;
        write!(f, "  Items:  {}", self.item_count)
    }
}

/// The current date at the store's UTC offset (UTC when none is set).
pub fn store_today(offset: Option<FixedOffset>) -> NaiveDate {
    let now = Utc::now();
    match offset {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

/// Seed the demo care plan for `patient_id`, or for the first patient when
/// `None`.
///
/// A new plan starts on `today` and runs for
/// [`template::DEMO_PLAN_DAYS`] days.
pub async fn seed_demo_plan(
    pool: &MySqlPool,
    patient_id: Option<i64>,
    today: NaiveDate,
) -> Result<SeedReport, SeedError> {
    let patient = resolve_patient(pool, patient_id).await?;
    debug!(patient_id = patient.id, name = %patient.name, "seeding patient");

    let (plan_id, created) = match care_plans::find_active_plan(pool, patient.id).await? {
        Some(existing) => {
            info!(plan_id = existing.id, patient_id = patient.id, "reusing active care plan");
            (existing.id, false)
        }
        None => {
            let plan_id =
                care_plans::create_plan(pool, patient.id, &template::demo_plan(today)).await?;
            (plan_id, true)
        }
    };

    care_plan_items::replace_items(pool, plan_id, &template::demo_items()).await?;

    let summary = care_plans::get_plan_with_item_count(pool, plan_id).await?;
    info!(
        plan_id,
        patient_id = patient.id,
        items = summary.task_count,
        created,
        "demo care plan seeded"
    );

    Ok(SeedReport {
        patient_id: patient.id,
        patient_name: patient.name,
        plan_id,
        title: summary.plan.title,
        start_date: summary.plan.start_date,
        end_date: summary.plan.end_date,
        status: summary.plan.status,
        item_count: summary.task_count,
        created,
    })
}

async fn resolve_patient(pool: &MySqlPool, patient_id: Option<i64>) -> Result<Patient, SeedError> {
    match patient_id {
        Some(id) => patients::get_patient(pool, id)
            .await?
            .ok_or(SeedError::PatientNotFound(id)),
        None => patients::first_patient(pool)
            .await?
            .ok_or(SeedError::NoPatient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_today_honours_offset() {
        let utc = store_today(None);
        let east = store_today(FixedOffset::east_opt(14 * 3600));
        let west = store_today(FixedOffset::west_opt(12 * 3600));
        assert!((east - utc).num_days().abs() <= 1);
        assert!((west - utc).num_days().abs() <= 1);
        assert!(east >= west);
    }

    #[test]
    fn report_display_mentions_action_and_counts() {
        let report = SeedReport {
            patient_id: 1,
            patient_name: "张三".to_owned(),
            plan_id: 42,
            title: template::DEMO_PLAN_TITLE.to_owned(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 5, 30).unwrap(),
            status: PlanStatus::Active,
            item_count: 8,
            created: true,
        };
        let text = report.to_string();
        assert!(text.contains("Care plan 42 created"));
        assert!(text.contains("张三"));
        assert!(text.contains("2025-03-01 .. 2025-05-30"));
        assert!(text.contains("Items:  8"));

        let refreshed = SeedReport {
            created: false,
            ..report
        };
        assert!(refreshed.to_string().contains("refreshed"));
    }
}
