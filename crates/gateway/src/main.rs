//! PUP STAR API Gateway
//!
//! The HTTP front of the research repository.
//! Handles:
//! - Public browsing, search and suggestions
//! - Admin record submission, editing and removal
//! - Admin authentication and rate limiting
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{from_fn, Next},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use pupstar_common::{
    auth::{AccountStore, AdminAuth, JwtManager, MemoryAccountStore},
    config::{AppConfig, DatabaseDriver, ObservabilityConfig, StorageDriver},
    db::{DbPool, Repository},
    metrics as app_metrics,
    records::{MemoryRecordStore, RecordStore},
    storage::{BlobStore, MemoryBlobStore, SupabaseBlobStore},
    RecordLifecycle,
};
use rand::{distributions::Alphanumeric, Rng};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{rate_limit_middleware, AuthRateLimit};

/// Room for the metadata part and multipart framing on top of the PDF
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub lifecycle: RecordLifecycle,
    pub auth: AdminAuth,
    pub jwt: Arc<JwtManager>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Largest accepted request body: one PDF plus the rest of the form
    pub fn body_limit(&self) -> usize {
        self.config
            .server
            .max_upload_bytes
            .saturating_add(MULTIPART_SLACK_BYTES)
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    init_tracing(&config.observability);
    info!("Starting PUP STAR API Gateway v{}", pupstar_common::VERSION);

    // Initialize metrics
    let metrics = install_metrics(&config)?;

    let state = build_state(config.clone(), metrics).await?;

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder when metrics are enabled
fn install_metrics(config: &AppConfig) -> anyhow::Result<Option<PrometheusHandle>> {
    if !config.observability.metrics_enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            app_metrics::LATENCY_BUCKETS,
        )?
        .install_recorder()?;
    app_metrics::register_metrics();

    Ok(Some(handle))
}

/// Wire the configured stores into the lifecycle manager and admin auth
async fn build_state(
    config: Arc<AppConfig>,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<AppState> {
    let (records, accounts): (Arc<dyn RecordStore>, Arc<dyn AccountStore>) =
        match config.database.driver {
            DatabaseDriver::Postgres => {
                let pool = DbPool::new(&config.database).await?;
                if config.database.run_migrations {
                    pool.migrate().await?;
                }
                let repository = Arc::new(Repository::new(pool));
                let records: Arc<dyn RecordStore> = repository.clone();
                let accounts: Arc<dyn AccountStore> = repository;
                (records, accounts)
            }
            DatabaseDriver::Memory => {
                warn!("Using the in-memory record store; records are lost on restart");
                let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
                let accounts: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
                (records, accounts)
            }
        };

    let blobs: Arc<dyn BlobStore> = match config.storage.driver {
        StorageDriver::Supabase => {
            info!(bucket = %config.storage.bucket, "Using Supabase Storage");
            Arc::new(SupabaseBlobStore::new(&config.storage)?)
        }
        StorageDriver::Memory => {
            warn!("Using the in-memory blob store; PDFs are lost on restart");
            Arc::new(MemoryBlobStore::default())
        }
    };

    let secret = match config.auth.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret.to_string(),
        _ => {
            warn!("auth.jwt_secret is not set; using a random secret, tokens end with this process");
            random_secret()
        }
    };
    let jwt = Arc::new(JwtManager::new(&secret, config.auth.jwt_expiration_secs));
    let auth = AdminAuth::new(accounts, jwt.clone());

    if let (Some(username), Some(password), Some(code)) = (
        config.auth.bootstrap_username.as_deref(),
        config.auth.bootstrap_password.as_deref(),
        config.auth.bootstrap_security_code.as_deref(),
    ) {
        auth.ensure_account(username, password, code).await?;
    }

    let lifecycle = RecordLifecycle::from_config(records, blobs, &config);

    Ok(AppState {
        config,
        lifecycle,
        auth,
        jwt,
        metrics,
    })
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id_header = HeaderName::try_from(state.config.server.request_id_header.as_str())
        .unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
    let request_id = SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::new(request_id_header);

    let body_limit = state.body_limit();

    // Record endpoints
    let record_routes = Router::new()
        .route(
            "/records",
            get(handlers::records::list_records)
                .post(handlers::records::create_record)
                .put(handlers::records::update_without_id),
        )
        .route("/records/search", get(handlers::records::search_records))
        .route("/records/suggest", get(handlers::records::suggest_records))
        .route(
            "/records/{id}",
            get(handlers::records::get_record)
                .put(handlers::records::update_record)
                .delete(handlers::records::delete_record),
        );

    // Auth endpoints
    let mut auth_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/verify-passcode", post(handlers::auth::verify_passcode))
        .route("/auth/update-password", post(handlers::auth::update_password));

    if state.config.rate_limit.enabled {
        let limit = AuthRateLimit::new(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        auth_routes = auth_routes.route_layer(from_fn(move |request: Request, next: Next| {
            rate_limit_middleware(request, next, limit.clone())
        }));
    }

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .merge(record_routes)
        .merge(auth_routes)
        .route_layer(from_fn(middleware::metrics::track_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(ConcurrencyLimitLayer::new(
            state.config.server.max_concurrent_requests.max(1),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request as HttpRequest, StatusCode},
    };
    use lopdf::{dictionary, Document, Object, Stream};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "pupstar-test-boundary";
    const USERNAME: &str = "admin";
    const PASSWORD: &str = "correct-horse";
    const SECURITY_CODE: &str = "2468";

    async fn test_app() -> Router {
        test_app_with(|_| {}).await
    }

    async fn test_app_with(configure: impl FnOnce(&mut AppConfig)) -> Router {
        let mut config = AppConfig::in_memory();
        config.auth.jwt_secret = Some("router-test-secret".to_string());
        config.auth.bootstrap_username = Some(USERNAME.to_string());
        config.auth.bootstrap_password = Some(PASSWORD.to_string());
        config.auth.bootstrap_security_code = Some(SECURITY_CODE.to_string());
        config.rate_limit.enabled = false;
        configure(&mut config);

        let state = build_state(Arc::new(config), None).await.unwrap();
        create_router(state)
    }

    /// A one-page PDF showing `label`
    fn sample_pdf(label: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", label);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1_i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn metadata(title: &str, date: &str, course: &str) -> Value {
        json!({
            "title": title,
            "authors": "Dela Cruz, Santos",
            "date": date,
            "course": course,
            "introduction": format!("About {}", title),
            "methodology": "Survey",
            "resultsAndDiscussion": "Positive"
        })
    }

    fn multipart(field: &str, metadata: &Value, file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{json}\r\n",
            b = BOUNDARY,
            field = field,
            json = metadata,
        )
        .into_bytes();

        if let Some((filename, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n",
                    b = BOUNDARY,
                    f = filename,
                    ct = content_type,
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }

        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Vec<u8>,
    ) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn login(app: &Router) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/auth/login",
                json!({"username": USERNAME, "password": PASSWORD}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tokenType"], "Bearer");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create(app: &Router, token: &str, title: &str, date: &str, course: &str) -> String {
        let body = multipart("metadata", &metadata(title, date, course), None);
        let (status, body) = send(app, multipart_request("POST", "/records", Some(token), body)).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["success"], true);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = test_app().await;

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["record_store"]["status"], "up");

        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_metrics_route_without_recorder_is_not_found() {
        let app = test_app().await;
        let (status, _) = send(&app, get("/metrics")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/login",
                json!({"username": USERNAME, "password": "nope"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_mutations_require_a_token() {
        let app = test_app().await;
        let body = multipart("metadata", &metadata("T", "2024-01-01", "computer-science"), None);

        let (status, _) = send(&app, multipart_request("POST", "/records", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = HttpRequest::builder()
            .method("DELETE")
            .uri("/records/anything")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_record_crud_round() {
        let app = test_app().await;
        let token = login(&app).await;

        let id = create(&app, &token, "Campus Wayfinding", "2020-06-01", "IT").await;

        let (status, record) = send(&app, get(&format!("/records/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["title"], "Campus Wayfinding");
        assert_eq!(record["course"], "Information Technology");
        assert_eq!(record["year"], 2020);
        assert_eq!(record["datePublished"], "June, 2020");
        assert_eq!(record["version"], 1);

        // edit with the current version
        let body = multipart(
            "studyData",
            &metadata("Campus Wayfinding v2", "2021-06-01", "IT"),
            None,
        );
        let mut request = multipart_request("PUT", &format!("/records/{}", id), Some(&token), body);
        request
            .headers_mut()
            .insert(header::IF_MATCH, "\"1\"".parse().unwrap());
        let (status, updated) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK, "{}", updated);
        assert_eq!(updated["title"], "Campus Wayfinding v2");
        assert_eq!(updated["year"], 2021);
        assert_eq!(updated["version"], 2);

        // a stale version is refused
        let body = multipart("metadata", &metadata("Stale", "2021-06-01", "IT"), None);
        let mut request = multipart_request("PUT", &format!("/records/{}", id), Some(&token), body);
        request
            .headers_mut()
            .insert(header::IF_MATCH, "1".parse().unwrap());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "VERSION_MISMATCH");

        let (_, all) = send(&app, get("/records")).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
        assert_eq!(all[0]["title"], "Campus Wayfinding v2");

        let request = HttpRequest::builder()
            .method("DELETE")
            .uri(format!("/records/{}", id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (status, body) = send(&app, get(&format!("/records/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "RECORD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_pdf_submission_round() {
        let app = test_app().await;
        let token = login(&app).await;

        let first = sample_pdf("first draft");
        let body = multipart(
            "metadata",
            &metadata("Campus Wayfinding", "2020-06-01", "IT"),
            Some(("wayfinding.pdf", "application/pdf", first.as_slice())),
        );
        let (status, created) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;
        assert_eq!(status, StatusCode::OK, "{}", created);
        let id = created["id"].as_str().unwrap().to_string();

        let (_, record) = send(&app, get(&format!("/records/{}", id))).await;
        let original = record["pdfReference"].as_str().unwrap().to_string();
        assert!(original.starts_with(&format!("memory://papers/study-{}-", id)));

        // replacing the file moves the reference
        let second = sample_pdf("final draft");
        let body = multipart(
            "metadata",
            &metadata("Campus Wayfinding", "2020-06-01", "IT"),
            Some(("wayfinding-final.pdf", "application/pdf", second.as_slice())),
        );
        let (status, updated) = send(
            &app,
            multipart_request("PUT", &format!("/records/{}", id), Some(&token), body),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", updated);
        let replaced = updated["pdfReference"].as_str().unwrap().to_string();
        assert_ne!(replaced, original);

        let (_, record) = send(&app, get(&format!("/records/{}", id))).await;
        assert_eq!(record["pdfReference"], replaced.as_str());
        assert_eq!(record["version"], 2);

        // metadata-only edits leave it alone
        let body = multipart("metadata", &metadata("Campus Wayfinding v2", "2020-06-01", "IT"), None);
        let (status, updated) = send(
            &app,
            multipart_request("PUT", &format!("/records/{}", id), Some(&token), body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["pdfReference"], replaced.as_str());
    }

    #[tokio::test]
    async fn test_empty_unnamed_file_part_is_no_file() {
        let app = test_app().await;
        let token = login(&app).await;

        let body = multipart(
            "metadata",
            &metadata("No Attachment", "2022-01-10", "IT"),
            Some(("", "application/octet-stream", &[][..])),
        );
        let (status, created) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;
        assert_eq!(status, StatusCode::OK, "{}", created);

        let (_, record) = send(&app, get(&format!("/records/{}", created["id"].as_str().unwrap()))).await;
        assert_eq!(record["title"], "No Attachment");
        assert!(record.get("pdfReference").is_none());
    }

    #[tokio::test]
    async fn test_body_over_the_limit_is_payload_too_large() {
        let app = test_app_with(|config| config.server.max_upload_bytes = 1024).await;
        let token = login(&app).await;

        let oversized = vec![b'%'; MULTIPART_SLACK_BYTES + 4096];
        let body = multipart(
            "metadata",
            &metadata("Too Big", "2022-01-10", "IT"),
            Some(("big.pdf", "application/pdf", oversized.as_slice())),
        );
        let (status, body) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");

        let (_, all) = send(&app, get("/records")).await;
        assert!(all.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_record_are_not_found() {
        let app = test_app().await;
        let token = login(&app).await;

        let body = multipart("metadata", &metadata("Ghost", "2024-01-01", "IT"), None);
        let (status, _) = send(
            &app,
            multipart_request("PUT", "/records/missing", Some(&token), body),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = HttpRequest::builder()
            .method("DELETE")
            .uri("/records/missing")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_without_id_is_missing_field() {
        let app = test_app().await;
        let token = login(&app).await;

        let body = multipart("metadata", &metadata("T", "2024-01-01", "IT"), None);
        let (status, body) = send(&app, multipart_request("PUT", "/records", Some(&token), body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_FIELD");
        assert_eq!(body["error"]["field"], "id");
    }

    #[tokio::test]
    async fn test_invalid_submissions_are_rejected_before_storage() {
        let app = test_app().await;
        let token = login(&app).await;

        // no metadata part at all
        let body = multipart("note", &json!("hello"), None);
        let (status, body) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "metadata");

        // unknown course
        let body = multipart("metadata", &metadata("T", "2024-01-01", "Nursing"), None);
        let (status, body) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["field"], "course");

        // a file that is not a PDF
        let body = multipart(
            "metadata",
            &metadata("T", "2024-01-01", "IT"),
            Some(("notes.txt", "text/plain", b"hello")),
        );
        let (status, _) = send(&app, multipart_request("POST", "/records", Some(&token), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, all) = send(&app, get("/records")).await;
        assert!(all.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_suggest() {
        let app = test_app().await;
        let token = login(&app).await;

        create(&app, &token, "Beyond the Itch", "2023-06-19", "computer-science").await;
        create(&app, &token, "Alumni Tracer", "2021-03-01", "IT").await;
        create(&app, &token, "Attendance via Face", "2021-09-01", "computer-science").await;

        let (status, page) = send(
            &app,
            get("/records/search?course=computer-science&sort=name&page=1"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["totalItems"], 2);
        assert_eq!(page["items"][0]["title"], "Attendance via Face");
        assert_eq!(page["items"][1]["title"], "Beyond the Itch");

        let (_, page) = send(&app, get("/records/search?year_from=2021&year_to=2021&sort=date")).await;
        assert_eq!(page["totalItems"], 2);
        assert_eq!(page["pageSize"], 4);

        let (status, _) = send(&app, get("/records/search?course=nursing")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, found) = send(&app, get("/records/suggest?q=itch")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["title"], "Beyond the Itch");

        let (_, none) = send(&app, get("/records/suggest?q=")).await;
        assert!(none.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let app = test_app().await;

        let (status, _) = send(
            &app,
            json_request("POST", "/auth/verify-passcode", json!({"passcode": "0000"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            json_request("POST", "/auth/verify-passcode", json!({"passcode": SECURITY_CODE})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["verified"], true);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/auth/update-password",
                json!({"securityCode": SECURITY_CODE, "newPassword": "abc", "confirmPassword": "abc"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/auth/update-password",
                json!({"securityCode": SECURITY_CODE, "newPassword": "brand-new", "confirmPassword": "brand-new"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/auth/login",
                json!({"username": USERNAME, "password": "brand-new"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_routes_are_rate_limited() {
        let mut config = AppConfig::in_memory();
        config.auth.jwt_secret = Some("router-test-secret".to_string());
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let state = tokio_test::assert_ok!(build_state(Arc::new(config), None).await);
        let app = create_router(state);

        let attempt = || json_request("POST", "/auth/login", json!({"username": "a", "password": "b"}));
        let (first, _) = send(&app, attempt()).await;
        assert_eq!(first, StatusCode::UNAUTHORIZED);

        let (second, body) = send(&app, attempt()).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "RATE_LIMITED");

        // public routes are not limited
        let (status, _) = send(&app, get("/records")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
