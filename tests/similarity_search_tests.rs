use manifold_vecstore::{ErrorKind, Record, SimilarityQuery, StoreDatabase};
use manifold_vectors::distance::cosine;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn vector_record(title: &str, vector: &[f32]) -> Record {
    Record::new(title, format!("{title} description")).with_embedding(vector)
}

fn random_vector(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()
}

#[test]
fn test_nearest_axis() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    let ids = store
        .insert_batch(&[
            vector_record("A", &[1.0, 0.0]),
            vector_record("B", &[0.0, 1.0]),
        ])
        .unwrap();

    let hits = store.query_top_k(&[0.9, 0.1], 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, ids[0]);
    assert!(hits[0].similarity > 0.99);
}

#[test]
fn test_equal_similarity_orders_by_id() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store
        .insert_batch(&[
            vector_record("A", &[1.0, 0.0]),
            vector_record("B", &[0.0, 1.0]),
        ])
        .unwrap();

    let hits = store.query_top_k(&[0.7, 0.7], 2).unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2]);
    for hit in &hits {
        assert!((hit.similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }
}

#[test]
fn test_k_larger_than_store() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store
        .insert_batch(&[
            vector_record("A", &[1.0, 0.0]),
            vector_record("B", &[0.0, 1.0]),
            vector_record("C", &[-1.0, 0.0]),
        ])
        .unwrap();

    let hits = store.query_top_k(&[1.0, 0.0], 10).unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[test]
fn test_empty_store_returns_nothing() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 4).unwrap();
    assert!(store.query_top_k(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().is_empty());
    assert!(
        store
            .search(&SimilarityQuery::text("anything", 3))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_query_argument_errors() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store.insert_one(&vector_record("A", &[1.0, 0.0])).unwrap();

    assert_eq!(
        store.query_top_k(&[1.0, 0.0], 0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        store.query_top_k(&[1.0, 0.0, 0.0], 1).unwrap_err().kind(),
        ErrorKind::DimensionMismatch
    );

    for k in [0, -1, i64::MIN] {
        let err = store
            .search(&SimilarityQuery::vector(vec![1.0, 0.0], k))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "k = {k}");
    }

    let neither = SimilarityQuery {
        query_text: None,
        query_vector: None,
        k: 1,
    };
    assert_eq!(
        store.search(&neither).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let both = SimilarityQuery {
        query_text: Some("text".to_string()),
        query_vector: Some(vec![1.0, 0.0]),
        k: 1,
    };
    assert_eq!(
        store.search(&both).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    assert_eq!(
        store
            .search(&SimilarityQuery::vector(vec![1.0], 1))
            .unwrap_err()
            .kind(),
        ErrorKind::DimensionMismatch
    );
}

#[test]
fn test_search_returns_record_text() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    store
        .insert_batch(&[
            Record::new("Oak door", "solid oak, oiled").with_embedding("[1.0, 0.0]"),
            Record::new("Steel door", "brushed steel").with_embedding("[0.0, 1.0]"),
        ])
        .unwrap();

    let hits = store
        .search(&SimilarityQuery::vector(vec![0.1, 0.9], 1))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);
    assert_eq!(hits[0].title, "Steel door");
    assert_eq!(hits[0].text, "brushed steel");

    let json = serde_json::to_value(&hits[0]).unwrap();
    assert_eq!(json["title"], "Steel door");
    assert_eq!(json["text"], "brushed steel");
}

#[test]
fn test_text_query_finds_matching_description() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 16).unwrap();
    let steel = store
        .insert_one(&Record::new("Steel door", "brushed steel"))
        .unwrap();
    store
        .insert_one(&Record::new("Oak door", "solid oak with brass fittings"))
        .unwrap();

    let request: SimilarityQuery =
        serde_json::from_str(r#"{"queryText": "brushed steel", "k": 1}"#).unwrap();
    let hits = store.search(&request).unwrap();
    assert_eq!(hits[0].id, steel);
    assert!(hits[0].similarity > 0.999);
}

#[test]
fn test_similarity_matches_cosine() {
    let mut rng = StdRng::seed_from_u64(7);
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 8).unwrap();

    let vectors: Vec<Vec<f32>> = (0..20).map(|_| random_vector(&mut rng, 8)).collect();
    let records: Vec<Record> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| vector_record(&format!("r{i}"), v))
        .collect();
    store.insert_batch(&records).unwrap();

    let query = random_vector(&mut rng, 8);
    for hit in store.query_top_k(&query, 5).unwrap() {
        let expected = cosine(&query, &vectors[usize::try_from(hit.id - 1).unwrap()]);
        assert!((hit.similarity - expected).abs() < 1e-5);
    }
}

#[test]
fn test_recall_against_exact_scan() {
    let mut rng = StdRng::seed_from_u64(42);
    let dimension = 16;
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", dimension).unwrap();

    let vectors: Vec<Vec<f32>> = (0..500)
        .map(|_| random_vector(&mut rng, dimension))
        .collect();
    let records: Vec<Record> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| vector_record(&format!("r{i}"), v))
        .collect();
    store.insert_batch(&records).unwrap();

    let store = store.with_search_breadth(100);
    let k = 10;
    let mut found = 0;
    for _ in 0..20 {
        let query = random_vector(&mut rng, dimension);

        let mut exact: Vec<(u64, f32)> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i as u64 + 1, cosine(&query, v)))
            .collect();
        exact.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let expected: Vec<u64> = exact.iter().take(k).map(|(id, _)| *id).collect();

        let hits = store.query_top_k(&query, k).unwrap();
        found += hits.iter().filter(|h| expected.contains(&h.id)).count();
    }

    let recall = found as f64 / (20 * k) as f64;
    assert!(recall > 0.9, "recall {recall}");
}

#[test]
fn test_search_breadth_per_handle() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 2).unwrap();
    assert_eq!(store.search_breadth(), 40);

    let wide = store.clone().with_search_breadth(200);
    assert_eq!(wide.search_breadth(), 200);
    assert_eq!(store.search_breadth(), 40);
    assert_eq!(store.clone().with_search_breadth(0).search_breadth(), 1);
}

#[test]
fn test_committed_records_are_immediately_searchable() {
    let db = StoreDatabase::open_in_memory().unwrap();
    let store = db.ensure_store("design", 3).unwrap();

    for i in 0..30u16 {
        let angle = f32::from(i) * 0.1;
        let id = store
            .insert_one(&vector_record(
                &format!("r{i}"),
                &[angle.cos(), angle.sin(), 0.5],
            ))
            .unwrap();
        let hits = store
            .query_top_k(&[angle.cos(), angle.sin(), 0.5], 1)
            .unwrap();
        assert_eq!(hits[0].id, id);
    }
}
