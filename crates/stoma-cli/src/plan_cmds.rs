//! Operator CLI handlers for `stoma plan` and `stoma item` subcommands.
//!
//! Implements:
//! - `stoma plan show <patient-id>`     -- list the plans of a patient
//! - `stoma plan get <plan-id>`         -- show one plan with its items
//! - `stoma plan create <patient-id>`   -- create a plan from flags
//! - `stoma plan status <plan-id> <s>`  -- change the status of a plan
//! - `stoma item complete <item-id>`    -- mark an item completed (or pending)

use anyhow::{Context, Result};
use sqlx::MySqlPool;

use stoma_db::models::{PlanDetail, PlanStatus};
use stoma_db::queries::care_plans::{self as plan_queries, NewCarePlan, RawCarePlan};
use stoma_db::queries::{care_plan_items as item_queries, patients};

use crate::{ItemCommands, PlanCommands};

// -----------------------------------------------------------------------
// Public entry points
// -----------------------------------------------------------------------

/// Dispatch a `PlanCommands` variant to the appropriate handler.
pub async fn run_plan_command(command: PlanCommands, pool: &MySqlPool) -> Result<()> {
    match command {
        PlanCommands::Show { patient_id } => cmd_show(pool, patient_id).await,
        PlanCommands::Get { plan_id } => cmd_get(pool, plan_id).await,
        PlanCommands::Create {
            patient_id,
            title,
            description,
            start,
            end,
            frequency,
            status,
            notes,
        } => {
            let raw = RawCarePlan {
                title,
                description,
                start_date: start,
                end_date: end,
                frequency,
                status,
                notes,
            };
            cmd_create(pool, patient_id, raw).await
        }
        PlanCommands::Status { plan_id, status } => cmd_status(pool, plan_id, &status).await,
    }
}

/// Dispatch an `ItemCommands` variant to the appropriate handler.
pub async fn run_item_command(command: ItemCommands, pool: &MySqlPool) -> Result<()> {
    match command {
        ItemCommands::Complete { item_id, undo } => cmd_complete(pool, item_id, !undo).await,
    }
}

// -----------------------------------------------------------------------
// stoma plan show <patient-id>
// -----------------------------------------------------------------------

async fn cmd_show(pool: &MySqlPool, patient_id: i64) -> Result<()> {
    let patient = patients::get_patient(pool, patient_id)
        .await?
        .with_context(|| format!("patient {patient_id} not found"))?;

    let plans = plan_queries::list_plans_for_patient(pool, patient_id).await?;
    if plans.is_empty() {
        println!("No care plans for patient {} ({}).", patient.id, patient.name);
        return Ok(());
    }

    let active = plan_queries::find_active_plan(pool, patient_id)
        .await?
        .map(|p| p.id);

    println!("Care plans for patient {} ({}):", patient.id, patient.name);
    println!();
    println!(
        "  {:<6} {:<10} {:<12} {:<12} {:<8} TITLE",
        "ID", "STATUS", "START", "END", "DONE"
    );
    for plan in &plans {
        let summary = plan_queries::get_plan_with_item_count(pool, plan.id).await?;
        let marker = if active == Some(plan.id) { "*" } else { " " };
        println!(
            "{marker} {:<6} {:<10} {:<12} {:<12} {:<8} {}",
            plan.id,
            plan.status,
            plan.start_date,
            plan.end_date,
            format!("{}/{}", summary.completed_count, summary.task_count),
            plan.title,
        );
    }

    Ok(())
}

// -----------------------------------------------------------------------
// stoma plan get <plan-id>
// -----------------------------------------------------------------------

async fn cmd_get(pool: &MySqlPool, plan_id: i64) -> Result<()> {
    let detail = plan_queries::get_plan_detail(pool, plan_id).await?;
    print_detail(&detail);
    Ok(())
}

fn print_detail(detail: &PlanDetail) {
    let plan = &detail.summary.plan;
    println!("Care plan {}: {}", plan.id, plan.title);
    println!("  Patient:   {}", plan.patient_id);
    println!("  Period:    {} .. {}", plan.start_date, plan.end_date);
    println!("  Frequency: {}", plan.frequency);
    println!("  Status:    {}", plan.status);
    if !plan.description.is_empty() {
        println!("  About:     {}", plan.description);
    }
    if !plan.notes.is_empty() {
        println!("  Notes:     {}", plan.notes);
    }
    println!(
        "  Progress:  {}/{}",
        detail.summary.completed_count, detail.summary.task_count
    );

    if detail.items.is_empty() {
        println!();
        println!("  (no items)");
        return;
    }

    println!();
    for item in &detail.items {
        let check = if item.completed { "x" } else { " " };
        print!("  [{check}] #{:<5} {}", item.id, item.title);
        if !item.target_value.is_empty() {
            print!(" ({})", item.target_value);
        }
        println!();
    }
}

// -----------------------------------------------------------------------
// stoma plan create <patient-id>
// -----------------------------------------------------------------------

async fn cmd_create(pool: &MySqlPool, patient_id: i64, raw: RawCarePlan) -> Result<()> {
    if patients::get_patient(pool, patient_id).await?.is_none() {
        anyhow::bail!("patient {patient_id} not found");
    }

    let plan = NewCarePlan::try_from(raw)?;
    let plan_id = plan_queries::create_plan(pool, patient_id, &plan).await?;

    println!("Care plan created.");
    println!();
    println!("  Plan ID:   {plan_id}");
    println!("  Title:     {}", plan.title);
    println!("  Period:    {} .. {}", plan.start_date, plan.end_date);
    println!("  Frequency: {}", plan.frequency);
    println!("  Status:    {}", plan.status);

    Ok(())
}

// -----------------------------------------------------------------------
// stoma plan status <plan-id> <status>
// -----------------------------------------------------------------------

async fn cmd_status(pool: &MySqlPool, plan_id: i64, status: &str) -> Result<()> {
    let status: PlanStatus = status.parse()?;
    plan_queries::update_plan_status(pool, plan_id, status).await?;
    println!("Care plan {plan_id} is now {status}.");
    Ok(())
}

// -----------------------------------------------------------------------
// stoma item complete <item-id> [--undo]
// -----------------------------------------------------------------------

async fn cmd_complete(pool: &MySqlPool, item_id: i64, completed: bool) -> Result<()> {
    item_queries::set_item_completed(pool, item_id, completed).await?;
    let item = item_queries::get_item(pool, item_id)
        .await?
        .with_context(|| format!("care plan item {item_id} not found"))?;

    let state = if item.completed { "completed" } else { "pending" };
    println!("Item {} ({}) marked {state}.", item.id, item.title);
    Ok(())
}
