//! Integration tests for the HTTP clients.
//!
//! Each test starts an in-process axum server on a random local port that
//! plays the processing service.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use avsearch_client::api::StatusSource;
use avsearch_client::library::list_videos;
use avsearch_client::search::{SearchContent, SearchQuery};
use avsearch_client::session::{AnonymousSession, SessionProvider, StaticSession};
use avsearch_client::storage::{HttpObjectStore, ObjectStore, ProgressCallback, UploadProgress};
use avsearch_client::upload::{UploadCandidate, upload_and_process};
use avsearch_client::{ApiClient, ArtifactKey, ClientConfig, Error, ProcessingStatus, Stage};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};

const TOKEN: &str = "secret-token";

#[derive(Default)]
struct Backend {
    auth_headers: Mutex<Vec<Option<String>>>,
    process_requests: Mutex<Vec<Value>>,
    search_requests: Mutex<Vec<Value>>,
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    status_calls: AtomicU64,
}

type Shared = Arc<Backend>;

fn record_auth(backend: &Backend, headers: &HeaderMap) {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.auth_headers.lock().push(value);
}

async fn status_handler(
    State(backend): State<Shared>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Response {
    record_auth(&backend, &headers);
    backend.status_calls.fetch_add(1, Ordering::SeqCst);

    match key.as_str() {
        "video_in/missing.mp4" => (StatusCode::NOT_FOUND, "no execution found").into_response(),
        "video_in/busy.mp4" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "video_in/garbled.mp4" => (StatusCode::OK, "<html>oops</html>").into_response(),
        "video_in/done.mp4" => Json(json!({
            "status": {
                "overall": "COMPLETED",
                "videoProcessing": "COMPLETED",
                "audioProcessing": "COMPLETED",
                "transcription": "COMPLETED",
                "embedding": "COMPLETED",
                "database": "COMPLETED"
            }
        }))
        .into_response(),
        _ => Json(json!({
            "status": {
                "overall": "RUNNING",
                "videoProcessing": "COMPLETED",
                "audioProcessing": "COMPLETED",
                "transcription": "RUNNING",
                "embedding": "PENDING",
                "database": "PENDING"
            },
            "executionDetails": {
                "executionArn": "arn:aws:states:us-east-1:123456789012:execution:VideoProcessingWorkflow:exec-1",
                "startDate": "2024-05-01T10:00:00Z",
                "videoFile": key,
                "steps": [{
                    "name": "Extract Video Frames",
                    "status": "COMPLETED",
                    "startTime": "2024-05-01T10:00:00Z",
                    "endTime": "2024-05-01T10:02:30Z",
                    "details": "Extracted 120 frames from video"
                }]
            }
        }))
        .into_response(),
    }
}

async fn process_handler(State(backend): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    backend.process_requests.lock().push(body);
    Json(json!({
        "executionArn": "arn:aws:states:us-east-1:123456789012:execution:VideoProcessingWorkflow:exec-42"
    }))
}

async fn search_handler(State(backend): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    backend.search_requests.lock().push(body);
    Json(json!({
        "results": [
            {
                "id": "result-3",
                "videoId": "video-3",
                "videoName": "Brainstorming Session.mp4",
                "timestamp": 512,
                "frameUrl": "https://example.com/frame123.jpg",
                "similarity": 0.79,
                "type": "image"
            },
            {
                "id": "result-1",
                "videoId": "video-1",
                "videoName": "Company Meeting.mp4",
                "timestamp": 125,
                "text": "We need to focus on improving customer satisfaction in Q3.",
                "similarity": 0.92,
                "type": "text",
                "speaker": "John Smith"
            },
            {
                "id": "result-5",
                "videoId": "video-5",
                "videoName": "All Hands.mp4",
                "timestamp": 40,
                "text": "Unrelated small talk.",
                "similarity": 0.41,
                "type": "text"
            },
            {
                "id": "result-2",
                "videoId": "video-2",
                "videoName": "Product Demo.mp4",
                "timestamp": 78,
                "text": "Customer feedback has been overwhelmingly positive.",
                "similarity": 0.87,
                "type": "text",
                "speaker": "Sarah Johnson"
            }
        ]
    }))
}

async fn transcript_handler(Path(key): Path<String>) -> Response {
    if key != "video_in/done.mp4" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "transcript": [
            {"start": 0, "end": 5, "text": "Hello and welcome to our presentation.", "speaker": "Speaker 1"},
            {"start": 6, "end": 10, "text": "Today we'll be discussing the new product features."}
        ]
    }))
    .into_response()
}

#[derive(serde::Deserialize)]
struct ListQuery {
    prefix: Option<String>,
}

async fn list_handler(
    State(backend): State<Shared>,
    Path(namespace): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    if namespace != "private" {
        return StatusCode::FORBIDDEN.into_response();
    }
    let prefix = query.prefix.unwrap_or_default();
    let items: Vec<Value> = backend
        .objects
        .lock()
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .map(|(key, (body, _))| {
            json!({"key": key, "size": body.len(), "lastModified": "2024-05-01T09:00:00Z"})
        })
        .collect();
    Json(json!({ "items": items })).into_response()
}

async fn put_handler(
    State(backend): State<Shared>,
    Path((_namespace, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    record_auth(&backend, &headers);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    backend.objects.lock().insert(key, (body, content_type));
    StatusCode::OK
}

async fn url_handler(
    State(backend): State<Shared>,
    Path((namespace, key)): Path<(String, String)>,
) -> Response {
    if !backend.objects.lock().contains_key(&key) {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({ "url": format!("https://cdn.example.com/{}/{}", namespace, key) })).into_response()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

async fn start_backend() -> (SocketAddr, Shared) {
    init_tracing();
    let backend: Shared = Arc::new(Backend::default());
    let app = Router::new()
        .route("/status/{key}", get(status_handler))
        .route("/process", post(process_handler))
        .route("/search", post(search_handler))
        .route("/transcript/{key}", get(transcript_handler))
        .route("/storage/{namespace}", get(list_handler))
        .route("/storage/{namespace}/{key}", axum::routing::put(put_handler))
        .route("/storage/{namespace}/{key}/url", get(url_handler))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    (addr, backend)
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(&format!("http://{}", addr))
        .expect("valid endpoint")
        .with_bucket("media-bucket")
}

fn session() -> Arc<dyn SessionProvider> {
    Arc::new(StaticSession::from_token(TOKEN))
}

fn key(name: &str) -> ArtifactKey {
    ArtifactKey::new(format!("video_in/{}", name)).expect("valid key")
}

mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_status_decodes_and_authenticates() {
        let (addr, backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let status = api.fetch_status(&key("demo.mp4")).await.expect("status");
        assert_eq!(status.overall(), ProcessingStatus::Running);
        assert_eq!(status.stage(Stage::Transcription), ProcessingStatus::Running);
        assert_eq!(status.execution_id(), Some("exec-1"));
        assert_eq!(
            status.execution().expect("execution").steps[0].duration(),
            Some(chrono::Duration::seconds(150))
        );

        let auth = backend.auth_headers.lock().clone();
        assert_eq!(auth, vec![Some(format!("Bearer {}", TOKEN))]);
    }

    #[tokio::test]
    async fn test_anonymous_session_sends_no_credentials() {
        let (addr, backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), Arc::new(AnonymousSession)).expect("client");

        api.fetch_status(&key("done.mp4")).await.expect("status");
        assert_eq!(backend.auth_headers.lock().clone(), vec![None]);
    }

    #[tokio::test]
    async fn test_error_classification() {
        let (addr, _backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let missing = api.fetch_status(&key("missing.mp4")).await.unwrap_err();
        assert!(matches!(missing, Error::Backend { status: 404, ref message } if message == "no execution found"));
        assert!(!missing.is_transient());

        let busy = api.fetch_status(&key("busy.mp4")).await.unwrap_err();
        assert!(matches!(busy, Error::Backend { status: 503, .. }));
        assert!(busy.is_transient());

        let garbled = api.fetch_status(&key("garbled.mp4")).await.unwrap_err();
        assert!(matches!(garbled, Error::Decode(_)));
        assert!(!garbled.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let api = ApiClient::new(config_for(addr), session()).expect("client");
        let err = api.fetch_status(&key("demo.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.is_transient());
    }
}

mod processing_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_processing_sends_s3_uri() {
        let (addr, backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let ticket = api
            .start_processing(&key("1714557600000-demo.mp4"))
            .await
            .expect("ticket");
        assert_eq!(ticket.execution_id, "exec-42");
        assert_eq!(ticket.key, key("1714557600000-demo.mp4"));

        let requests = backend.process_requests.lock().clone();
        assert_eq!(
            requests,
            vec![json!({"s3_uri": "s3://media-bucket/video_in/1714557600000-demo.mp4"})]
        );
    }

    #[tokio::test]
    async fn test_start_processing_requires_bucket() {
        let (addr, backend) = start_backend().await;
        let config = config_for(addr).with_bucket("");
        let api = ApiClient::new(config, session()).expect("client");

        let err = api.start_processing(&key("demo.mp4")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.process_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_transcript() {
        let (addr, _backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let segments = api.transcript(&key("done.mp4")).await.expect("transcript");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].speaker.as_deref(), Some("Speaker 1"));
        assert!(segments[1].speaker.is_none());

        let err = api.transcript(&key("other.mp4")).await.unwrap_err();
        assert!(matches!(err, Error::Backend { status: 404, .. }));
    }
}

mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let (addr, backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let hits = api
            .search(&SearchQuery::new("  customer feedback "))
            .await
            .expect("search");
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["result-1", "result-2", "result-3"]);
        assert_eq!(hits[0].similarity_percent(), 92);
        assert!(matches!(hits[2].content, SearchContent::Image { .. }));

        let requests = backend.search_requests.lock().clone();
        assert_eq!(
            requests,
            vec![json!({"query": "customer feedback", "limit": 20, "threshold": 0.7})]
        );
    }

    #[tokio::test]
    async fn test_invalid_query_sends_nothing() {
        let (addr, backend) = start_backend().await;
        let api = ApiClient::new(config_for(addr), session()).expect("client");

        let err = api.search(&SearchQuery::new("   ")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.search_requests.lock().is_empty());
    }
}

mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_put_list_and_download_url() {
        let (addr, backend) = start_backend().await;
        let store = HttpObjectStore::new(config_for(addr), session()).expect("store");

        let seen: Arc<Mutex<Vec<UploadProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let progress: ProgressCallback = {
            let seen = seen.clone();
            Arc::new(move |p: UploadProgress| seen.lock().push(p))
        };

        let body = Bytes::from(vec![1u8; 600 * 1024]);
        store
            .put(&key("1-a.mp4"), body.clone(), "video/mp4", Some(progress))
            .await
            .expect("put");

        let (stored, content_type) = backend
            .objects
            .lock()
            .get("video_in/1-a.mp4")
            .cloned()
            .expect("stored object");
        assert_eq!(stored, body);
        assert_eq!(content_type, "video/mp4");

        let seen = seen.lock().clone();
        assert!(seen.len() > 1);
        assert_eq!(seen.last().map(|p| p.percent()), Some(100));
        assert!(seen.windows(2).all(|w| w[0].loaded < w[1].loaded));

        let listed = store.list("video_in/").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 600 * 1024);
        assert!(listed[0].last_modified.is_some());

        let url = store.download_url(&key("1-a.mp4")).await.expect("url");
        assert_eq!(url, "https://cdn.example.com/private/video_in/1-a.mp4");
    }

    #[tokio::test]
    async fn test_upload_and_process() {
        let (addr, backend) = start_backend().await;
        let config = config_for(addr);
        let store = HttpObjectStore::new(config.clone(), session()).expect("store");
        let api = ApiClient::new(config, session()).expect("client");

        let candidate = UploadCandidate::new("demo.mp4", "video/mp4", 4);
        let ticket = upload_and_process(&store, &api, &candidate, Bytes::from_static(b"abcd"), None)
            .await
            .expect("upload");

        assert!(ticket.key.as_str().starts_with("video_in/"));
        assert!(ticket.key.as_str().ends_with("-demo.mp4"));
        assert!(backend.objects.lock().contains_key(ticket.key.as_str()));
        assert_eq!(backend.process_requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_upload_sends_nothing() {
        let (addr, backend) = start_backend().await;
        let config = config_for(addr);
        let store = HttpObjectStore::new(config.clone(), session()).expect("store");
        let api = ApiClient::new(config, session()).expect("client");

        let candidate = UploadCandidate::new("notes.txt", "text/plain", 4);
        let err = upload_and_process(&store, &api, &candidate, Bytes::from_static(b"abcd"), None)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(backend.objects.lock().is_empty());
        assert!(backend.process_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_list_videos_against_backend() {
        let (addr, backend) = start_backend().await;
        {
            let mut objects = backend.objects.lock();
            for name in ["video_in/done.mp4", "video_in/missing.mp4", "video_in/readme.txt"] {
                objects.insert(name.to_string(), (Bytes::from_static(b"x"), "video/mp4".to_string()));
            }
        }

        let config = config_for(addr);
        let store = HttpObjectStore::new(config.clone(), session()).expect("store");
        let api = ApiClient::new(config, session()).expect("client");

        let entries = list_videos(&store, &api, 4).await.expect("list videos");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "done.mp4");
        assert_eq!(entries[0].status, Some(ProcessingStatus::Completed));
        assert_eq!(entries[1].name, "missing.mp4");
        assert_eq!(entries[1].status, None);
        assert!(entries.iter().all(|e| e.url.is_some()));
        assert_eq!(backend.status_calls.load(Ordering::SeqCst), 2);
    }
}
