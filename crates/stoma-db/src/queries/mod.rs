//! Query functions grouped by table.

pub mod care_plan_items;
pub mod care_plans;
pub mod education;
pub mod patients;
