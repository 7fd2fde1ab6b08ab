//! Integration tests for URL probing and ingestion against a mock web server

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardsmith_engine::blob::{BlobStore, FsBlobStore};
use cardsmith_engine::db::Database;
use cardsmith_engine::ingest::{blob_key, Ingestor};
use sdk::types::{SourceKind, SubjectKind};

const PAGE: &str = "<html><head><style>p { color: red }</style></head>\
    <body><h1>Jane Doe</h1><p>Jane Doe served two terms on the county board \
    and chaired the budget committee.</p></body></html>";

async fn setup() -> (TempDir, Arc<Database>, Arc<FsBlobStore>, Ingestor) {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::new(&dir.path().join("test.db")).await.unwrap());
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("blobs")));
    db.subjects()
        .upsert(3, "Jane Doe", SubjectKind::Profile, None)
        .await
        .unwrap();

    let store: Arc<dyn BlobStore> = Arc::clone(&blobs) as Arc<dyn BlobStore>;
    let ingestor = Ingestor::new(Arc::clone(&db), store, 4, Duration::from_secs(5)).unwrap();
    (dir, db, blobs, ingestor)
}

async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/thin"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>hi</p>", "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bio"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE, "text/html")
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_probe_keeps_first_usable_in_input_order() {
    let (_dir, _db, _blobs, ingestor) = setup().await;
    let site = mock_site().await;

    let urls = vec![
        format!("{}/missing", site.uri()),
        format!("{}/thin", site.uri()),
        format!("{}/bio", site.uri()),
        format!("{}/about", site.uri()),
    ];
    let fetched = ingestor.probe(&urls).await.unwrap();

    // /bio answers last but comes first in the list
    assert_eq!(fetched.url, urls[2]);
    assert!(fetched.text.starts_with("Jane Doe Jane Doe served two terms"));
    assert!(!fetched.text.contains("color"));
}

#[tokio::test]
async fn test_probe_with_no_usable_url() {
    let (_dir, _db, _blobs, ingestor) = setup().await;
    let site = mock_site().await;

    let urls = vec![format!("{}/missing", site.uri()), format!("{}/thin", site.uri())];
    assert!(ingestor.probe(&urls).await.is_none());
}

#[tokio::test]
async fn test_ingest_registers_and_reuses_part() {
    let (_dir, db, blobs, ingestor) = setup().await;
    let site = mock_site().await;
    let about = format!("{}/about", site.uri());

    let unit = ingestor.ingest(3, &[about.clone()]).await.unwrap();
    assert_eq!(unit.part, 1);
    assert_eq!(unit.kind, SourceKind::WebPage);
    assert_eq!(unit.link.as_deref(), Some(about.as_str()));
    assert_eq!(unit.path, blob_key(3, &about));

    let stored = blobs.read_text(&unit.path).await.unwrap();
    assert!(stored.contains("chaired the budget committee."));

    // same URL again keeps the unit
    let again = ingestor.ingest(3, &[about.clone()]).await.unwrap();
    assert_eq!(again.id, unit.id);
    assert_eq!(again.part, 1);

    // a new URL becomes the next part
    let bio = ingestor
        .ingest(3, &[format!("{}/bio", site.uri())])
        .await
        .unwrap();
    assert_eq!(bio.part, 2);
    assert_eq!(db.sources().count(3).await.unwrap(), 2);
}

#[tokio::test]
async fn test_ingest_errors() {
    let (_dir, _db, _blobs, ingestor) = setup().await;
    let site = mock_site().await;

    assert!(ingestor.ingest(3, &[]).await.is_err());

    let err = ingestor
        .ingest(42, &[format!("{}/about", site.uri())])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Subject 42 not found"));

    let err = ingestor
        .ingest(3, &[format!("{}/missing", site.uri())])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("returned usable text"));
}
