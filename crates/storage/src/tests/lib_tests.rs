use super::*;
use shared::domain::{ItemType, ItineraryItem};

fn trip(id: &str, title: &str) -> Trip {
    Trip {
        id: TripId::from(id),
        title: title.to_string(),
        destination: "Lisbon".to_string(),
        ..Trip::default()
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("planner.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn missing_trip_list_loads_as_empty() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert!(storage.load_trips().await.is_empty());
}

#[tokio::test]
async fn corrupt_trip_list_loads_as_empty() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .write_raw(TRIPS_KEY, "{not json")
        .await
        .expect("write corrupt");

    assert!(storage.load_trips().await.is_empty());

    storage
        .upsert_trip(&trip("t-1", "Recovered"))
        .await
        .expect("upsert over corrupt data");
    let trips = storage.load_trips().await;
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].title, "Recovered");
}

#[tokio::test]
async fn upsert_replaces_by_id_and_keeps_items() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.upsert_trip(&trip("t-1", "First")).await.expect("first");
    storage.upsert_trip(&trip("t-2", "Second")).await.expect("second");

    let mut updated = trip("t-1", "First, revised");
    updated.items.push(ItineraryItem::new(
        2,
        "14:00",
        "Tram 28",
        ItemType::Travel,
        3.0,
        "Alfama",
    ));
    storage.upsert_trip(&updated).await.expect("update");

    let trips = storage.load_trips().await;
    assert_eq!(trips.len(), 2);
    let first = trips
        .iter()
        .find(|t| t.id.as_str() == "t-1")
        .expect("t-1 present");
    assert_eq!(first.title, "First, revised");
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].day, 2);
}

#[tokio::test]
async fn remove_reports_whether_trip_existed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.upsert_trip(&trip("t-1", "First")).await.expect("first");

    assert!(storage
        .remove_trip(&TripId::from("t-1"))
        .await
        .expect("remove"));
    assert!(!storage
        .remove_trip(&TripId::from("t-1"))
        .await
        .expect("second remove"));
    assert!(storage.load_trips().await.is_empty());
}

#[tokio::test]
async fn clear_drops_the_whole_list() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_trips(&[trip("a", "A"), trip("b", "B")])
        .await
        .expect("save");
    storage.clear_trips().await.expect("clear");

    assert!(storage.read_raw(TRIPS_KEY).await.expect("read").is_none());
    assert!(storage.load_trips().await.is_empty());
}

#[tokio::test]
async fn remove_trips_keeps_ids_outside_the_set() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .save_trips(&[trip("a", "A"), trip("b", "B"), trip("c", "C")])
        .await
        .expect("save");

    let ids: HashSet<TripId> = [TripId::from("a"), TripId::from("c"), TripId::from("zzz")]
        .into_iter()
        .collect();
    assert_eq!(storage.remove_trips(&ids).await.expect("remove"), 2);

    let remaining = storage.load_trips().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id.as_str(), "b");

    let rest: HashSet<TripId> = [TripId::from("b")].into_iter().collect();
    assert_eq!(storage.remove_trips(&rest).await.expect("remove rest"), 1);
    assert!(storage.read_raw(TRIPS_KEY).await.expect("read").is_none());
}

#[tokio::test]
async fn trips_survive_reopening_file_database() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("planner.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.upsert_trip(&trip("t-1", "Kept")).await.expect("upsert");
        storage.pool().close().await;
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let trips = reopened.load_trips().await;
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].title, "Kept");
}

#[test]
fn sqlite_path_ignores_memory_and_strips_query() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/planner.db?mode=rwc"),
        Some(PathBuf::from("./data/planner.db"))
    );
}
