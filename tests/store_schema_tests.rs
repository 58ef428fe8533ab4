use manifold_vecstore::{ErrorKind, Record, StoreConfig, StoreDatabase};
use tempfile::NamedTempFile;

fn create_tempfile() -> NamedTempFile {
    if cfg!(target_os = "wasi") {
        NamedTempFile::new_in("/tmp").unwrap()
    } else {
        NamedTempFile::new().unwrap()
    }
}

fn vector_record(title: &str, vector: &[f32]) -> Record {
    Record::new(title, format!("{title} description")).with_embedding(vector)
}

#[test]
fn test_ensure_store_creates_once() {
    let _ = env_logger::try_init();
    let db = StoreDatabase::open_in_memory().unwrap();

    let store = db.ensure_store("design", 3).unwrap();
    store.insert_one(&vector_record("a", &[1.0, 0.0, 0.0])).unwrap();

    let again = db.ensure_store("design", 3).unwrap();
    assert_eq!(again.len().unwrap(), 1);
    assert_eq!(db.list_stores().unwrap(), vec!["design".to_string()]);
}

#[test]
fn test_dimension_conflict_leaves_store_untouched() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 3).unwrap();
    store.insert_one(&vector_record("a", &[1.0, 0.0, 0.0])).unwrap();

    let err = db.ensure_store("design", 5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    assert!(err.to_string().contains("dimension 3"));

    assert_eq!(store.dimension().unwrap(), 3);
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_invalid_store_names() {
    let db = StoreDatabase::open_in_memory().unwrap();
    for name in ["", "has space", "dotted.name", "slash/name"] {
        let err = db.ensure_store(name, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "name {name:?}");
    }
    assert!(db.list_stores().unwrap().is_empty());
}

#[test]
fn test_reset_store_discards_records_and_ids() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store
        .insert_batch(&[
            vector_record("a", &[1.0, 0.0]),
            vector_record("b", &[0.0, 1.0]),
        ])
        .unwrap();

    let store = db.reset_store("design", 4).unwrap();
    assert_eq!(store.dimension().unwrap(), 4);
    assert!(store.is_empty().unwrap());
    assert!(store.query_top_k(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());

    let id = store
        .insert_one(&vector_record("c", &[0.0, 0.0, 1.0, 0.0]))
        .unwrap();
    assert_eq!(id, 1);
}

#[test]
fn test_reset_creates_missing_store() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.reset_store("fresh", 2).unwrap();
    assert!(store.is_empty().unwrap());
    assert_eq!(db.list_stores().unwrap(), vec!["fresh".to_string()]);
}

#[test]
fn test_drop_store_invalidates_handles() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store.insert_one(&vector_record("a", &[1.0, 0.0])).unwrap();

    db.drop_store("design").unwrap();
    assert!(db.list_stores().unwrap().is_empty());
    assert_eq!(store.len().unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        store.query_top_k(&[1.0, 0.0], 1).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(store.begin_write().unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(db.store("design").unwrap_err().kind(), ErrorKind::NotFound);

    // Recreating the store revives existing handles, empty.
    db.ensure_store("design", 2).unwrap();
    assert_eq!(store.len().unwrap(), 0);
    assert!(store.get(1).unwrap().is_none());
}

#[test]
fn test_drop_store_twice() {
    let db = StoreDatabase::open_in_memory().unwrap();
    db.ensure_store("design", 2).unwrap();
    db.drop_store("design").unwrap();
    assert_eq!(db.drop_store("design").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_stores_are_independent() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let doors = db.ensure_store("doors", 2).unwrap();
    let windows = db.ensure_store("windows", 3).unwrap();

    doors.insert_one(&vector_record("oak", &[1.0, 0.0])).unwrap();
    let id = windows
        .insert_one(&vector_record("sash", &[0.0, 1.0, 0.0]))
        .unwrap();

    // Ids are assigned per store.
    assert_eq!(id, 1);

    db.drop_store("doors").unwrap();
    assert_eq!(windows.len().unwrap(), 1);
    assert_eq!(db.list_stores().unwrap(), vec!["windows".to_string()]);
}

#[test]
fn test_reopen_rebuilds_index_from_records() {
    let _ = env_logger::try_init();
    let tmpfile = create_tempfile();

    {
        let db = StoreDatabase::open(tmpfile.path()).unwrap();
        let store = db.ensure_store("design", 2).unwrap();
        store
            .insert_batch(&[
                vector_record("east", &[1.0, 0.0]),
                vector_record("north", &[0.0, 1.0]),
                vector_record("north-east", &[0.7, 0.7]),
            ])
            .unwrap();
    }

    let db = StoreDatabase::open(tmpfile.path()).unwrap();
    assert_eq!(db.list_stores().unwrap(), vec!["design".to_string()]);

    let store = db.store("design").unwrap();
    let meta = store.metadata().unwrap();
    assert_eq!(meta.dimension, 2);
    assert_eq!(meta.next_id, 4);
    assert_eq!(meta.committed(), 3);

    let stats = store.ensure_index().unwrap();
    assert_eq!(stats.len, 3);
    assert_eq!(stats.dimension, 2);

    let hits = store.query_top_k(&[0.1, 1.0], 1).unwrap();
    assert_eq!(hits[0].id, 2);

    let record = store.get(3).unwrap().unwrap();
    assert_eq!(record.title, "north-east");
    assert_eq!(record.embedding, vec![0.7, 0.7]);

    // Ids continue after the last committed record.
    let id = store.insert_one(&vector_record("west", &[-1.0, 0.0])).unwrap();
    assert_eq!(id, 4);
}

#[test]
fn test_reopen_after_drop() {
    let tmpfile = create_tempfile();

    {
        let db = StoreDatabase::open(tmpfile.path()).unwrap();
        db.ensure_store("kept", 2).unwrap();
        db.ensure_store("dropped", 2).unwrap();
        db.drop_store("dropped").unwrap();
    }

    let db = StoreDatabase::open(tmpfile.path()).unwrap();
    assert_eq!(db.list_stores().unwrap(), vec!["kept".to_string()]);
}

#[test]
fn test_open_store_without_reset_keeps_records() {
    let tmpfile = create_tempfile();
    let config = StoreConfig {
        vector_dimension: 2,
        ..StoreConfig::default()
    };

    {
        let db = StoreDatabase::builder()
            .config(config.clone())
            .open(tmpfile.path())
            .unwrap();
        let store = db.open_store("design").unwrap();
        store.insert_one(&vector_record("a", &[1.0, 0.0])).unwrap();
    }

    let db = StoreDatabase::builder()
        .config(config)
        .open(tmpfile.path())
        .unwrap();
    let store = db.open_store("design").unwrap();
    assert_eq!(store.len().unwrap(), 1);
}

#[test]
fn test_open_store_with_reset_starts_empty() {
    let tmpfile = create_tempfile();

    {
        let db = StoreDatabase::builder()
            .config(StoreConfig {
                vector_dimension: 2,
                ..StoreConfig::default()
            })
            .open(tmpfile.path())
            .unwrap();
        let store = db.open_store("design").unwrap();
        store.insert_one(&vector_record("a", &[1.0, 0.0])).unwrap();
    }

    let db = StoreDatabase::builder()
        .config(StoreConfig {
            vector_dimension: 3,
            ..StoreConfig::development()
        })
        .open(tmpfile.path())
        .unwrap();
    let store = db.open_store("design").unwrap();
    assert!(store.is_empty().unwrap());
    assert_eq!(store.dimension().unwrap(), 3);
}

#[test]
fn test_open_store_dimension_conflict() {
    let db = StoreDatabase::builder()
        .config(StoreConfig {
            vector_dimension: 2,
            ..StoreConfig::default()
        })
        .open_in_memory()
        .unwrap();
    db.ensure_store("design", 5).unwrap();

    let err = db.open_store("design").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaConflict);
}

#[test]
fn test_persisted_index_parameters_win() {
    let tmpfile = create_tempfile();

    {
        let db = StoreDatabase::builder()
            .config(StoreConfig {
                index_max_connectivity: 8,
                index_construction_breadth: 32,
                ..StoreConfig::default()
            })
            .open(tmpfile.path())
            .unwrap();
        db.ensure_store("design", 2).unwrap();
    }

    let db = StoreDatabase::builder()
        .config(StoreConfig {
            index_max_connectivity: 24,
            index_construction_breadth: 100,
            ..StoreConfig::default()
        })
        .open(tmpfile.path())
        .unwrap();
    let store = db.ensure_store("design", 2).unwrap();

    let meta = store.metadata().unwrap();
    assert_eq!(meta.max_connectivity, 8);
    assert_eq!(meta.construction_breadth, 32);

    let stats = store.ensure_index().unwrap();
    assert_eq!(stats.config.max_connectivity, 8);
    assert_eq!(stats.config.construction_breadth, 32);

    // A reset picks up the configured values.
    let store = db.reset_store("design", 2).unwrap();
    assert_eq!(store.metadata().unwrap().max_connectivity, 24);
}

#[test]
fn test_config_from_lookup_drives_open_store() {
    let config = StoreConfig::from_lookup(|key| match key {
        "MANIFOLD_RESET_ON_STARTUP" => Some("reset".to_string()),
        "MANIFOLD_VECTOR_DIMENSION" => Some("6".to_string()),
        _ => None,
    })
    .unwrap();

    let db = StoreDatabase::builder()
        .config(config)
        .open_in_memory()
        .unwrap();
    let store = db.open_store("design").unwrap();
    assert_eq!(store.dimension().unwrap(), 6);
}
