//! Integration tests for the demo-plan seeder.

use chrono::NaiveDate;

use stoma_core::seed::{self, SeedError, template};
use stoma_db::models::{Frequency, PlanStatus};
use stoma_db::queries::care_plans::{self, NewCarePlan};
use stoma_db::queries::{care_plan_items, patients};
use stoma_test_utils::{create_test_db, drop_test_db};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

async fn count(pool: &sqlx::MySqlPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn seeding_zhang_san_creates_the_demo_plan() {
    let (pool, db_name) = create_test_db().await;
    let patient_id = patients::insert_patient(&pool, "张三", Some("13800138000"), Some("结肠造口"))
        .await
        .unwrap();

    let report = seed::seed_demo_plan(&pool, None, today())
        .await
        .expect("seeding should succeed");

    assert!(report.created);
    assert_eq!(report.patient_id, patient_id);
    assert_eq!(report.patient_name, "张三");
    assert_eq!(report.title, "造口日常护理计划");
    assert_eq!(report.status, PlanStatus::Active);
    assert_eq!(report.start_date, today());
    assert_eq!(report.end_date, NaiveDate::from_ymd_opt(2025, 5, 30).unwrap());
    assert_eq!(report.item_count, 8);

    let summary = care_plans::get_plan_with_item_count(&pool, report.plan_id)
        .await
        .unwrap();
    assert_eq!(summary.plan.frequency, Frequency::Daily);
    assert_eq!(summary.task_count, 8);

    let items = care_plan_items::list_items(&pool, report.plan_id).await.unwrap();
    let orders: Vec<i32> = items.iter().map(|i| i.sort_order).collect();
    assert_eq!(orders, (1..=8).collect::<Vec<i32>>());
    let expected: Vec<String> = template::demo_items().into_iter().map(|d| d.title).collect();
    let titles: Vec<String> = items.into_iter().map(|i| i.title).collect();
    assert_eq!(titles, expected);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn seeding_twice_keeps_one_plan_with_eight_items() {
    let (pool, db_name) = create_test_db().await;
    patients::insert_patient(&pool, "张三", None, None).await.unwrap();

    let first = seed::seed_demo_plan(&pool, None, today()).await.unwrap();
    // A completed task must be reset by the next run.
    let items = care_plan_items::list_items(&pool, first.plan_id).await.unwrap();
    care_plan_items::set_item_completed(&pool, items[0].id, true)
        .await
        .unwrap();

    let later = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
    let second = seed::seed_demo_plan(&pool, None, later).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.plan_id, first.plan_id);
    assert_eq!(second.start_date, first.start_date, "reused plan keeps its dates");
    assert_eq!(second.item_count, 8);
    assert_eq!(count(&pool, "care_plans").await, 1);
    assert_eq!(count(&pool, "care_plan_items").await, 8);

    let summary = care_plans::get_plan_with_item_count(&pool, first.plan_id)
        .await
        .unwrap();
    assert_eq!(summary.completed_count, 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn seeding_reuses_an_existing_active_plan() {
    let (pool, db_name) = create_test_db().await;
    let patient_id = patients::insert_patient(&pool, "李四", None, None).await.unwrap();

    let existing = care_plans::create_plan(
        &pool,
        patient_id,
        &NewCarePlan {
            title: "术后早期护理".into(),
            ..template::demo_plan(today())
        },
    )
    .await
    .unwrap();

    let report = seed::seed_demo_plan(&pool, Some(patient_id), today())
        .await
        .unwrap();
    assert!(!report.created);
    assert_eq!(report.plan_id, existing);
    assert_eq!(report.title, "术后早期护理");
    assert_eq!(report.item_count, 8);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn seeding_targets_the_given_patient() {
    let (pool, db_name) = create_test_db().await;
    patients::insert_patient(&pool, "张三", None, None).await.unwrap();
    let second = patients::insert_patient(&pool, "王五", None, None).await.unwrap();

    let report = seed::seed_demo_plan(&pool, Some(second), today())
        .await
        .unwrap();
    assert_eq!(report.patient_id, second);
    assert_eq!(report.patient_name, "王五");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn seeding_without_patients_fails() {
    let (pool, db_name) = create_test_db().await;

    let err = seed::seed_demo_plan(&pool, None, today())
        .await
        .expect_err("no patients to seed");
    assert!(matches!(err, SeedError::NoPatient), "got {err:?}");
    assert_eq!(count(&pool, "care_plans").await, 0);

    let err = seed::seed_demo_plan(&pool, Some(77), today())
        .await
        .expect_err("unknown patient");
    assert!(matches!(err, SeedError::PatientNotFound(77)), "got {err:?}");

    pool.close().await;
    drop_test_db(&db_name).await;
}
