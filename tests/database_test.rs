//! Warehouse tests: loading, refresh, search and reports

use channel_analytics::analytics::{KeywordVocabulary, TopProductsQuery, TrendDirection};
use channel_analytics::batch::{batch_path, write_batch, write_detections};
use channel_analytics::db::Database;
use channel_analytics::loader::Loader;
use channel_analytics::metrics::PipelineMetrics;
use channel_analytics::models::{format_message_date, DateRange, DetectionRecord, MessageSearch, RawMessage};
use channel_analytics::transform;
use channel_analytics::{AnalyticsError, ReportService};
use chrono::{Duration, Utc};
use tempfile::{tempdir, TempDir};

fn message(id: i64, hours_ago: i64, text: Option<&str>, views: Option<i64>, has_media: bool) -> RawMessage {
    RawMessage {
        id,
        date: format_message_date(Utc::now() - Duration::hours(hours_ago)),
        text: text.map(str::to_string),
        views,
        has_media,
        channel: None,
        media_path: None,
    }
}

fn setup() -> (TempDir, Database) {
    let dir = tempdir().expect("Failed to create temp dir");
    let db = Database::new(&dir.path().join("warehouse.db")).expect("Failed to create database");
    (dir, db)
}

fn write_channel(dir: &TempDir, channel: &str, messages: &[RawMessage]) {
    let path = batch_path(&dir.path().join("raw"), Utc::now().date_naive(), channel);
    write_batch(messages, &path).expect("Failed to write batch");
}

fn seed(dir: &TempDir, db: &Database) {
    write_channel(
        dir,
        "chemed",
        &[
            message(1, 2, Some("Take paracetamol daily"), Some(1500), true),
            message(2, 3, Some("Buy vitamin C today"), Some(250), false),
            message(3, 4, None, None, true),
        ],
    );
    write_channel(
        dir,
        "lobelia4cosmetics",
        &[message(10, 5, Some("Vitamin C serum 50% off"), Some(40), true)],
    );

    let loader = Loader::new(db.clone());
    loader
        .load_directory(&dir.path().join("raw"), &mut PipelineMetrics::new())
        .expect("Failed to load batches");
    transform::refresh(db).expect("Failed to refresh warehouse");
}

fn search(query: &str) -> MessageSearch {
    MessageSearch {
        query: query.to_string(),
        channel: None,
        date_range: DateRange::default(),
        has_media: None,
        min_views: None,
        page: 1,
        page_size: 20,
    }
}

#[test]
fn test_database_creation() {
    let (_dir, db) = setup();
    let _conn = db.get_connection().expect("Failed to get database connection");
    assert_eq!(db.count_raw_messages().unwrap(), 0);
    assert_eq!(db.count_detections().unwrap(), 0);
}

#[test]
fn test_loading_is_idempotent() {
    let (dir, db) = setup();
    write_channel(
        &dir,
        "chemed",
        &[message(1, 1, Some("first"), Some(5), false), message(2, 1, Some("second"), None, false)],
    );
    let loader = Loader::new(db.clone());
    let raw_dir = dir.path().join("raw");

    let first = loader.load_directory(&raw_dir, &mut PipelineMetrics::new()).unwrap();
    assert_eq!(first.files, 1);
    assert_eq!(first.inserted, 2);

    let mut metrics = PipelineMetrics::new();
    let second = loader.load_directory(&raw_dir, &mut metrics).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(metrics.duplicates_skipped_total, 2);
    assert_eq!(db.count_raw_messages().unwrap(), 2);
}

#[test]
fn test_same_id_in_different_channels_is_kept() {
    let (dir, db) = setup();
    write_channel(&dir, "chemed", &[message(7, 1, Some("a"), None, false)]);
    write_channel(&dir, "tikvahpharma", &[message(7, 1, Some("b"), None, false)]);

    let stats = Loader::new(db.clone())
        .load_directory(&dir.path().join("raw"), &mut PipelineMetrics::new())
        .unwrap();
    assert_eq!(stats.inserted, 2);
    assert_eq!(db.count_raw_messages().unwrap(), 2);
}

#[test]
fn test_unparseable_dates_are_skipped() {
    let (dir, db) = setup();
    let mut bad = message(2, 1, Some("bad"), None, false);
    bad.date = "yesterday".to_string();
    write_channel(&dir, "chemed", &[message(1, 1, Some("ok"), None, false), bad]);

    let stats = Loader::new(db.clone())
        .load_directory(&dir.path().join("raw"), &mut PipelineMetrics::new())
        .unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.invalid, 1);
}

#[test]
fn test_malformed_batch_fails_load() {
    let (dir, db) = setup();
    let path = batch_path(&dir.path().join("raw"), Utc::now().date_naive(), "chemed");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let result = Loader::new(db).load_file(&path);
    assert!(result.is_err());
}

#[test]
fn test_transform_builds_derived_tables() {
    let (dir, db) = setup();
    seed(&dir, &db);

    assert_eq!(db.count_fact_messages().unwrap(), 4);
    assert_eq!(db.count_channels().unwrap(), 2);

    let channels = db.list_channels().unwrap();
    assert_eq!(channels[0].channel, "chemed");
    assert_eq!(channels[0].total_messages, 3);
    assert_eq!(channels[1].channel, "lobelia4cosmetics");
    assert!(channels[0].first_message_date <= channels[0].last_message_date);

    let since = (Utc::now() - Duration::days(1)).naive_utc();
    let facts = db.fact_messages_since(since, Some("chemed")).unwrap();
    let by_id = |id: i64| facts.iter().find(|f| f.message_id == id).unwrap();

    assert_eq!(by_id(1).engagement_level.as_deref(), Some("high"));
    assert_eq!(by_id(1).message_length, 22);
    assert_eq!(by_id(2).engagement_level.as_deref(), Some("medium"));
    assert_eq!(by_id(3).engagement_level.as_deref(), Some("low"));
    assert_eq!(by_id(3).message_length, 0);

    // A second refresh rebuilds rather than appends
    transform::refresh(&db).unwrap();
    assert_eq!(db.count_fact_messages().unwrap(), 4);
}

#[test]
fn test_search_filters_and_pagination() {
    let (dir, db) = setup();
    seed(&dir, &db);

    let (total, hits) = db.search_messages(&search("vitamin")).unwrap();
    assert_eq!(total, 2);
    // Newest first
    assert_eq!(hits[0].id, 2);
    assert_eq!(hits[1].id, 10);

    let mut filtered = search("vitamin");
    filtered.channel = Some("lobelia4cosmetics".to_string());
    let (total, hits) = db.search_messages(&filtered).unwrap();
    assert_eq!(total, 1);
    assert_eq!(hits[0].channel, "lobelia4cosmetics");

    let mut media = search("vitamin");
    media.has_media = Some(true);
    assert_eq!(db.search_messages(&media).unwrap().0, 1);

    let mut popular = search("vitamin");
    popular.min_views = Some(100);
    let (_, hits) = db.search_messages(&popular).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);

    let mut paged = search("vitamin");
    paged.page = 2;
    paged.page_size = 1;
    let (total, hits) = db.search_messages(&paged).unwrap();
    assert_eq!(total, 2);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 10);
}

#[test]
fn test_search_folds_non_ascii_case() {
    let (dir, db) = setup();
    write_channel(&dir, "chemed", &[message(1, 1, Some("ÉCHINACÉE syrup"), Some(5), false)]);
    Loader::new(db.clone())
        .load_directory(&dir.path().join("raw"), &mut PipelineMetrics::new())
        .unwrap();
    transform::refresh(&db).unwrap();

    assert_eq!(db.search_messages(&search("échinacée")).unwrap().0, 1);
    assert_eq!(db.search_messages(&search("ÉchinaCÉE SYRUP")).unwrap().0, 1);
}

#[test]
fn test_search_past_last_page_is_empty() {
    let (dir, db) = setup();
    seed(&dir, &db);

    let mut far = search("vitamin");
    far.page = u32::MAX;
    far.page_size = 100;
    let (total, hits) = db.search_messages(&far).unwrap();
    assert_eq!(total, 2);
    assert!(hits.is_empty());
}

#[test]
fn test_search_treats_wildcards_literally() {
    let (dir, db) = setup();
    seed(&dir, &db);

    assert_eq!(db.search_messages(&search("50%")).unwrap().0, 1);
    assert_eq!(db.search_messages(&search("%")).unwrap().0, 1);
    assert_eq!(db.search_messages(&search("_")).unwrap().0, 0);
}

#[test]
fn test_detections_load_once_per_file() {
    let (dir, db) = setup();
    let path = dir.path().join("enriched/detections.json");
    let records = vec![
        DetectionRecord {
            file_path: "/data/images/chemed/chemed_1.jpg".to_string(),
            relative_path: "chemed/chemed_1.jpg".to_string(),
            filename: "chemed_1.jpg".to_string(),
            detected_objects: vec!["bottle".to_string(), "bottle".to_string()],
            object_count: 2,
            confidence_score: Some(0.8),
        },
        DetectionRecord {
            file_path: "/data/images/lobelia4cosmetics/lobelia4cosmetics_10.jpg".to_string(),
            relative_path: "lobelia4cosmetics/lobelia4cosmetics_10.jpg".to_string(),
            filename: "lobelia4cosmetics_10.jpg".to_string(),
            detected_objects: Vec::new(),
            object_count: 0,
            confidence_score: None,
        },
    ];
    write_detections(&records, &path).unwrap();

    let loader = Loader::new(db.clone());
    let first = loader.load_detections(&path, &mut PipelineMetrics::new()).unwrap();
    assert_eq!(first.inserted, 2);
    let second = loader.load_detections(&path, &mut PipelineMetrics::new()).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(db.count_detections().unwrap(), 2);

    let chemed = db.detections_for_channel("chemed", 10).unwrap();
    assert_eq!(chemed.len(), 1);
    assert_eq!(chemed[0].detected_objects, vec!["bottle", "bottle"]);
    assert_eq!(chemed[0].confidence_score, Some(0.8));
}

#[test]
fn test_top_products_report() {
    let (dir, db) = setup();
    seed(&dir, &db);
    let reports = ReportService::new(db, KeywordVocabulary::default()).unwrap();

    let query = TopProductsQuery {
        min_mentions: 1,
        ..TopProductsQuery::default()
    };
    let products = reports.top_products(&query).unwrap();

    assert_eq!(products[0].keyword, "vitamin");
    assert_eq!(products[0].mention_count, 2);
    assert_eq!(products[0].channels, vec!["chemed", "lobelia4cosmetics"]);
    assert!((products[0].avg_views - 145.0).abs() < f64::EPSILON);
    // All mentions fall in the recent half of the window
    assert_eq!(products[0].trend_direction, TrendDirection::Up);

    let paracetamol = products.iter().find(|p| p.keyword == "paracetamol").unwrap();
    assert_eq!(paracetamol.mention_count, 1);
    assert_eq!(paracetamol.sample_messages, vec!["Take paracetamol daily"]);

    // The default threshold of 3 mentions filters everything out
    assert!(reports.top_products(&TopProductsQuery::default()).unwrap().is_empty());
}

#[test]
fn test_channel_activity_report() {
    let (dir, db) = setup();
    seed(&dir, &db);
    let reports = ReportService::new(db, KeywordVocabulary::default()).unwrap();

    let activity = reports.channel_activity("chemed", &Default::default()).unwrap();
    assert_eq!(activity.channel, "chemed");
    assert_eq!(activity.total_messages, 3);
    assert!((activity.media_percentage - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(activity.engagement_distribution.get("high"), Some(&1));
    assert_eq!(activity.engagement_distribution.get("low"), Some(&1));
    assert!(activity.top_keywords.iter().any(|k| k.keyword == "paracetamol"));

    let unknown = reports.channel_activity("nosuchchannel", &Default::default());
    assert!(matches!(unknown, Err(AnalyticsError::ChannelNotFound(_))));
}

#[test]
fn test_dashboard_report() {
    let (dir, db) = setup();
    seed(&dir, &db);
    let reports = ReportService::new(db, KeywordVocabulary::default()).unwrap();

    let data = reports.dashboard(7).unwrap();
    assert_eq!(data.period_days, 7);
    assert_eq!(data.total_messages, 4);
    assert_eq!(data.total_channels, 2);
    assert_eq!(data.top_channels[0].channel, "chemed");
}
