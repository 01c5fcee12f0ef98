//! Database query functions for the `patients` table.

use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::models::Patient;

/// Insert a patient and return its assigned id.
pub async fn insert_patient(
    pool: &MySqlPool,
    name: &str,
    phone: Option<&str>,
    stoma_type: Option<&str>,
) -> Result<i64, StoreError> {
    let result = sqlx::query("INSERT INTO patients (name, phone, stoma_type) VALUES (?, ?, ?)")
        .bind(name)
        .bind(phone)
        .bind(stoma_type)
        .execute(pool)
        .await?;

    Ok(result.last_insert_id() as i64)
}

/// Fetch a patient by id.
pub async fn get_patient(pool: &MySqlPool, id: i64) -> Result<Option<Patient>, StoreError> {
    let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(patient)
}

/// The first patient in id order, if any exist.
pub async fn first_patient(pool: &MySqlPool) -> Result<Option<Patient>, StoreError> {
    let patient = sqlx::query_as::<_, Patient>("SELECT * FROM patients ORDER BY id ASC LIMIT 1")
        .fetch_optional(pool)
        .await?;

    Ok(patient)
}

/// List all patients in id order.
pub async fn list_patients(pool: &MySqlPool) -> Result<Vec<Patient>, StoreError> {
    let patients = sqlx::query_as::<_, Patient>("SELECT * FROM patients ORDER BY id ASC")
        .fetch_all(pool)
        .await?;

    Ok(patients)
}
