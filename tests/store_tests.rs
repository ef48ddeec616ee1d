mod common;

use chrono::{Duration, Utc};
use pricewatch::{
    error::StoreError,
    models::{FetchStatus, NewSample},
    services::store::Store,
};

use common::temp_store;

fn sample(item_id: &str, price: Option<f64>) -> NewSample {
    NewSample {
        item_id: item_id.to_string(),
        checked_at: Utc::now(),
        price,
        status: if price.is_some() { FetchStatus::Ok } else { FetchStatus::NoPrice },
        raw_text: price.map(|p| format!("₹ {p}")),
    }
}

#[tokio::test]
async fn add_item_validates_and_defaults_name_to_url() {
    let (store, _dir) = temp_store();

    let err = store.add_item(Some("x"), "   ", 100.0).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store.add_item(None, "https://a.example/p", -1.0).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store.add_item(None, "https://a.example/p", f64::NAN).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let id = store.add_item(Some("  "), " https://a.example/p ", 0.0).await.unwrap();
    let item = store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.url, "https://a.example/p");
    assert_eq!(item.name, "https://a.example/p");
    assert_eq!(item.target_price, 0.0);
    assert_eq!(item.last_alert_at, None);
}

#[tokio::test]
async fn ids_are_unique_and_items_list_in_creation_order() {
    let (store, _dir) = temp_store();
    let a = store.add_item(Some("A"), "https://a.example", 1.0).await.unwrap();
    let b = store.add_item(Some("B"), "https://b.example", 2.0).await.unwrap();
    assert_ne!(a, b);

    let names: Vec<String> = store.list_items().await.unwrap().into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[tokio::test]
async fn update_target_and_last_alert_at() {
    let (store, _dir) = temp_store();
    let id = store.add_item(None, "https://a.example", 500.0).await.unwrap();

    store.update_target(&id, 420.0).await.unwrap();
    let at = Utc::now();
    store.set_last_alert_at(&id, at).await.unwrap();

    let item = store.get_item(&id).await.unwrap().unwrap();
    assert_eq!(item.target_price, 420.0);
    assert_eq!(item.last_alert_at.map(|t| t.timestamp_millis()), Some(at.timestamp_millis()));

    assert!(matches!(store.update_target("nope", 1.0).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.update_target(&id, -5.0).await, Err(StoreError::Validation(_))));
    assert!(matches!(store.set_last_alert_at("nope", at).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn missing_price_is_kept_distinct_from_zero() {
    let (store, _dir) = temp_store();
    let id = store.add_item(None, "https://a.example", 10.0).await.unwrap();

    store.record_sample(sample(&id, None)).await.unwrap();
    store.record_sample(sample(&id, Some(0.0))).await.unwrap();

    let history = store.history_for(&id, 10).await.unwrap();
    assert_eq!(history[0].price, Some(0.0));
    assert_eq!(history[1].price, None);
    assert_eq!(history[1].status, FetchStatus::NoPrice);
}

#[tokio::test]
async fn history_is_most_recent_first_and_bounded() {
    let (store, _dir) = temp_store();
    let id = store.add_item(None, "https://a.example", 10.0).await.unwrap();

    for p in [100.0, 200.0, 300.0, 400.0] {
        store.record_sample(sample(&id, Some(p))).await.unwrap();
    }

    let prices: Vec<Option<f64>> = store
        .history_for(&id, 3)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.price)
        .collect();
    assert_eq!(prices, vec![Some(400.0), Some(300.0), Some(200.0)]);

    assert!(store.history_for(&id, 0).await.unwrap().is_empty());
    let latest = store.latest_sample_for(&id).await.unwrap().unwrap();
    assert_eq!(latest.price, Some(400.0));
}

#[tokio::test]
async fn checked_at_never_goes_backwards_within_an_item() {
    let (store, _dir) = temp_store();
    let id = store.add_item(None, "https://a.example", 10.0).await.unwrap();

    let first = store.record_sample(sample(&id, Some(50.0))).await.unwrap();

    let mut late = sample(&id, Some(60.0));
    late.checked_at = Utc::now() - Duration::hours(1);
    let second = store.record_sample(late).await.unwrap();

    assert!(second.checked_at >= first.checked_at);
    assert!(second.id > first.id);
}

#[tokio::test]
async fn history_only_grows_until_delete_empties_it() {
    let (store, _dir) = temp_store();
    let id = store.add_item(None, "https://a.example", 10.0).await.unwrap();
    let other = store.add_item(None, "https://b.example", 10.0).await.unwrap();
    store.record_sample(sample(&other, Some(99.0))).await.unwrap();

    let mut last_len = 0;
    for i in 0..5 {
        store.record_sample(sample(&id, Some(20.0 + i as f64))).await.unwrap();
        let len = store.history_for(&id, 100).await.unwrap().len();
        assert!(len > last_len);
        last_len = len;
    }

    store.delete_item(&id).await.unwrap();
    assert!(store.history_for(&id, 100).await.unwrap().is_empty());
    assert!(store.get_item(&id).await.unwrap().is_none());
    assert!(matches!(store.delete_item(&id).await, Err(StoreError::NotFound(_))));

    // other items are untouched
    assert_eq!(store.history_for(&other, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn samples_for_unknown_items_are_rejected() {
    let (store, _dir) = temp_store();
    let err = store.record_sample(sample("ghost", Some(12.0))).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn dashboard_pairs_each_item_with_its_latest_sample() {
    let (store, _dir) = temp_store();
    let a = store.add_item(Some("A"), "https://a.example", 10.0).await.unwrap();
    let b = store.add_item(Some("B"), "https://b.example", 10.0).await.unwrap();

    store.record_sample(sample(&a, Some(111.0))).await.unwrap();
    store.record_sample(sample(&a, None)).await.unwrap();

    let rows = store.dashboard_snapshot().await.unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].item.id, a);
    let latest = rows[0].latest.as_ref().unwrap();
    assert_eq!(latest.price, None);
    assert_eq!(latest.status, FetchStatus::NoPrice);

    assert_eq!(rows[1].item.id, b);
    assert!(rows[1].latest.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_samples_for_different_items_are_all_kept() {
    const N: usize = 40;
    let (store, _dir) = temp_store();

    let mut ids = Vec::new();
    for i in 0..N {
        ids.push(store.add_item(None, &format!("https://shop.example/{i}"), 10.0).await.unwrap());
    }

    let mut set = tokio::task::JoinSet::new();
    for id in ids.clone() {
        let store = store.clone();
        set.spawn(async move { store.record_sample(sample(&id, Some(42.0))).await });
    }
    while let Some(res) = set.join_next().await {
        res.unwrap().unwrap();
    }

    let mut total = 0;
    for id in &ids {
        total += store.history_for(id, 100).await.unwrap().len();
    }
    assert_eq!(total, N);
}

#[tokio::test]
async fn reopening_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prices.db");

    let id = {
        let store = Store::open(&path).unwrap();
        let id = store.add_item(Some("Keep"), "https://a.example", 10.0).await.unwrap();
        store.record_sample(sample(&id, Some(77.0))).await.unwrap();
        id
    };

    let store = Store::open(&path).unwrap();
    assert_eq!(store.get_item(&id).await.unwrap().unwrap().name, "Keep");
    assert_eq!(store.history_for(&id, 5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn corrupt_file_is_recreated_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prices.db");
    std::fs::write(&path, "this is not a database ".repeat(512)).unwrap();

    assert!(Store::open(&path).is_err());

    let store = Store::open_or_recreate(&path).unwrap();
    assert!(store.list_items().await.unwrap().is_empty());
    store.add_item(None, "https://a.example", 1.0).await.unwrap();
    assert_eq!(store.list_items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn default_name_is_filled_once_and_user_names_are_kept() {
    let (store, _dir) = temp_store();
    let unnamed = store.add_item(None, "https://a.example/p", 10.0).await.unwrap();
    let named = store.add_item(Some("Mine"), "https://b.example/p", 10.0).await.unwrap();

    assert!(store.fill_default_name(&unnamed, "Steel Kettle").await.unwrap());
    assert!(!store.fill_default_name(&unnamed, "Other Title").await.unwrap());
    assert!(!store.fill_default_name(&named, "Page Title").await.unwrap());
    assert!(!store.fill_default_name("ghost", "Title").await.unwrap());

    assert_eq!(store.get_item(&unnamed).await.unwrap().unwrap().name, "Steel Kettle");
    assert_eq!(store.get_item(&named).await.unwrap().unwrap().name, "Mine");
}
