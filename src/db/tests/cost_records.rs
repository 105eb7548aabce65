use chrono::{TimeZone, Utc};

use super::harness::create_test_db;
use crate::{
    db::repos::Page,
    models::{CostRecordFilter, NewCostRecord},
};

fn record(service: &str, project: &str, sku: &str, day: u32, cost: f64) -> NewCostRecord {
    NewCostRecord {
        service: service.to_string(),
        project: project.to_string(),
        sku: sku.to_string(),
        time_period: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        cost,
        currency: "USD".to_string(),
        usage_amount: None,
        usage_unit: None,
    }
}

#[tokio::test]
async fn upsert_inserts_then_overwrites_on_natural_key() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    let first = repo
        .upsert(record("Compute Engine", "proj-a", "sku-1", 1, 10.0))
        .await
        .unwrap();
    assert_eq!(first.cost, 10.0);

    let mut update = record("Compute Engine", "proj-a", "sku-1", 1, 15.0);
    update.currency = "EUR".to_string();
    update.usage_amount = Some(3.5);
    update.usage_unit = Some("hour".to_string());
    let second = repo.upsert(update).await.unwrap();

    // Same row: id and created_at survive, value columns are replaced.
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.cost, 15.0);
    assert_eq!(second.currency, "EUR");
    assert_eq!(second.usage_amount, Some(3.5));
    assert_eq!(second.usage_unit.as_deref(), Some("hour"));

    let listed = repo
        .list(&CostRecordFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test]
async fn batch_upsert_is_idempotent_across_runs() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    let batch = vec![
        record("Compute Engine", "proj-a", "sku-1", 1, 10.0),
        record("Cloud Storage", "proj-a", "sku-2", 1, 2.5),
    ];

    let first_run = repo.upsert_batch(batch.clone()).await.unwrap();
    assert_eq!(first_run.len(), 2);

    let second_run = repo.upsert_batch(batch).await.unwrap();
    assert_eq!(second_run.len(), 2);

    let listed = repo
        .list(&CostRecordFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 2);

    // created_at is owned by the first run.
    for persisted in &second_run {
        let original = first_run.iter().find(|r| r.id == persisted.id).unwrap();
        assert_eq!(persisted.created_at, original.created_at);
    }
}

#[tokio::test]
async fn batch_collision_on_same_key_keeps_last_value() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    let persisted = repo
        .upsert_batch(vec![
            record("ComputeEngine", "proj-A", "sku-1", 1, 10.0),
            record("ComputeEngine", "proj-A", "sku-1", 1, 15.0),
        ])
        .await
        .unwrap();

    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].cost, 15.0);

    let total = repo
        .sum_cost(&CostRecordFilter::for_project(Some("proj-A".to_string())))
        .await
        .unwrap();
    assert_eq!(total, 15.0);
}

#[tokio::test]
async fn empty_batch_is_a_noop() {
    let db = create_test_db().await;
    let persisted = db.cost_records().upsert_batch(vec![]).await.unwrap();
    assert!(persisted.is_empty());
}

#[tokio::test]
async fn list_filters_and_counts_before_pagination() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    repo.upsert_batch(vec![
        record("Compute Engine", "proj-a", "sku-1", 1, 1.0),
        record("Compute Engine", "proj-a", "sku-2", 2, 2.0),
        record("Cloud Storage", "proj-b", "sku-3", 3, 3.0),
        record("Compute Engine", "proj-a", "sku-4", 4, 4.0),
    ])
    .await
    .unwrap();

    let filter = CostRecordFilter {
        project: Some("proj-a".to_string()),
        ..Default::default()
    };
    let page = Page { skip: 1, limit: 1 };
    let result = repo.list(&filter, page).await.unwrap();

    // Total reflects the filter, not the page window.
    assert_eq!(result.total, 3);
    assert_eq!(result.items.len(), 1);
    // Deterministic ordering: day, project, service, sku.
    assert_eq!(result.items[0].sku, "sku-2");
}

#[tokio::test]
async fn list_respects_inclusive_date_range() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    repo.upsert_batch(vec![
        record("Compute Engine", "proj-a", "sku-1", 1, 1.0),
        record("Compute Engine", "proj-a", "sku-1", 2, 2.0),
        record("Compute Engine", "proj-a", "sku-1", 3, 3.0),
    ])
    .await
    .unwrap();

    let filter = CostRecordFilter {
        start_date: Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
        end_date: Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
        ..Default::default()
    };
    let result = repo.list(&filter, Page::default()).await.unwrap();
    assert_eq!(result.total, 2);
    let costs: Vec<f64> = result.items.iter().map(|r| r.cost).collect();
    assert_eq!(costs, vec![2.0, 3.0]);
}

#[tokio::test]
async fn sum_cost_is_zero_for_empty_store() {
    let db = create_test_db().await;
    let total = db
        .cost_records()
        .sum_cost(&CostRecordFilter::default())
        .await
        .unwrap();
    assert_eq!(total, 0.0);
}

#[tokio::test]
async fn get_by_id_round_trips() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    let persisted = repo
        .upsert(record("Compute Engine", "proj-a", "sku-1", 1, 9.75))
        .await
        .unwrap();

    let fetched = repo.get_by_id(persisted.id).await.unwrap().unwrap();
    assert_eq!(fetched.cost, 9.75);
    assert_eq!(fetched.service, "Compute Engine");

    let missing = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn distinct_dimensions_are_sorted_and_deduplicated() {
    let db = create_test_db().await;
    let repo = db.cost_records();

    repo.upsert_batch(vec![
        record("Compute Engine", "proj-b", "sku-2", 1, 1.0),
        record("Cloud Storage", "proj-a", "sku-1", 1, 1.0),
        record("Compute Engine", "proj-a", "sku-1", 2, 1.0),
    ])
    .await
    .unwrap();

    assert_eq!(
        repo.distinct_services().await.unwrap(),
        vec!["Cloud Storage", "Compute Engine"]
    );
    assert_eq!(
        repo.distinct_projects().await.unwrap(),
        vec!["proj-a", "proj-b"]
    );
    assert_eq!(repo.distinct_skus().await.unwrap(), vec!["sku-1", "sku-2"]);
}
