//! Database query functions for the `care_plan_items` table.

use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{CarePlanItem, MAX_TITLE_CHARS};

/// One item of a replacement batch. Its position in the batch becomes its
/// `sort_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_value: String,
}

impl ItemDraft {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        target_value: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            target_value: target_value.into(),
        }
    }
}

impl ItemDraft {
    fn validate(&self, position: usize) -> Result<(), StoreError> {
        let number = position + 1;
        if self.title.trim().is_empty() {
            return Err(StoreError::validation(format!(
                "item {number} has an empty title"
            )));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(StoreError::validation(format!(
                "item {number} title is longer than {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.target_value.chars().count() > MAX_TITLE_CHARS {
            return Err(StoreError::validation(format!(
                "item {number} target is longer than {MAX_TITLE_CHARS} characters"
            )));
        }
        Ok(())
    }
}

/// Replace every item of a plan with `items`, in order.
///
/// Runs in one transaction holding a lock on the plan row: concurrent
/// readers see either the old item set or the new one. Fails with
/// `NotFound` when the plan does not exist and with `Validation` when a
/// draft does not fit the columns; nothing is changed in either case.
pub async fn replace_items(
    pool: &MySqlPool,
    plan_id: i64,
    items: &[ItemDraft],
) -> Result<(), StoreError> {
    for (position, item) in items.iter().enumerate() {
        item.validate(position)?;
    }

    let mut tx = pool.begin().await?;

    let plan: Option<i64> = sqlx::query_scalar("SELECT id FROM care_plans WHERE id = ? FOR UPDATE")
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?;
    if plan.is_none() {
        // Transaction rolls back on drop.
        return Err(StoreError::not_found("care plan", plan_id));
    }

    let removed = sqlx::query("DELETE FROM care_plan_items WHERE plan_id = ?")
        .bind(plan_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for (position, item) in items.iter().enumerate() {
        let sort_order = i32::try_from(position + 1)
            .map_err(|_| StoreError::validation("too many items in one plan"))?;
        sqlx::query(
            "INSERT INTO care_plan_items \
             (plan_id, title, description, target_value, completed, sort_order) \
             VALUES (?, ?, ?, ?, FALSE, ?)",
        )
        .bind(plan_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.target_value)
        .bind(sort_order)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(plan_id, removed, inserted = items.len(), "care plan items replaced");
    Ok(())
}

/// List the items of a plan in display order.
pub async fn list_items(pool: &MySqlPool, plan_id: i64) -> Result<Vec<CarePlanItem>, StoreError> {
    let items = sqlx::query_as::<_, CarePlanItem>(
        "SELECT * FROM care_plan_items \
         WHERE plan_id = ? \
         ORDER BY sort_order ASC, id ASC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Fetch a single item by id.
pub async fn get_item(pool: &MySqlPool, id: i64) -> Result<Option<CarePlanItem>, StoreError> {
    let item = sqlx::query_as::<_, CarePlanItem>("SELECT * FROM care_plan_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(item)
}

/// Set the completion flag of an item. Last write wins.
pub async fn set_item_completed(
    pool: &MySqlPool,
    id: i64,
    completed: bool,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE care_plan_items SET completed = ? WHERE id = ?")
        .bind(completed)
        .bind(id)
        .execute(pool)
        .await?;

    // Zero affected rows also means "value unchanged" on MySQL.
    if result.rows_affected() == 0 && get_item(pool, id).await?.is_none() {
        return Err(StoreError::not_found("care plan item", id));
    }

    debug!(item_id = id, completed, "care plan item updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_fitting_the_columns_is_valid() {
        let draft = ItemDraft::new("护".repeat(MAX_TITLE_CHARS), "", "每日1次");
        assert!(draft.validate(0).is_ok());
    }

    #[test]
    fn over_long_title_names_the_item() {
        let draft = ItemDraft::new("x".repeat(MAX_TITLE_CHARS + 1), "", "");
        let err = draft.validate(2).unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref m) if m.starts_with("item 3 title")));
    }

    #[test]
    fn over_long_target_is_rejected() {
        let draft = ItemDraft::new("换袋", "", "y".repeat(MAX_TITLE_CHARS + 1));
        assert!(matches!(draft.validate(0), Err(StoreError::Validation(_))));
    }
}
