use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Parser, Subcommand, ValueEnum};
use preview_kernel::{KernelBuilder, PreviewKernel};
use preview_protocol::{
    Diagnostic, DiffView, ErrorKind, FileView, FormatOutput, FormatRequest, LintOutput,
    LintRequest, PreviewError, SessionId, SessionStatus, SessionSummary, TreeNode,
};
use preview_sandbox::{ProcessBackend, SandboxLimits, ThreadBackend, WorkerBackend};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod openapi;

use crate::openapi::{openapi_spec, scalar_docs_html};

#[derive(Debug, Parser)]
#[command(name = "preview-api")]
#[command(about = "Preview session and sandboxed code-intelligence API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,
    #[arg(long, default_value_t = 1800)]
    session_ttl_secs: u64,
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = 10_000)]
    sandbox_timeout_ms: u64,
    #[arg(long, default_value_t = 1024 * 1024)]
    max_input_bytes: usize,
    #[arg(long, value_enum, default_value_t = BackendKind::Process)]
    sandbox_backend: BackendKind,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve sandbox requests as JSON lines on stdin/stdout.
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Thread,
    Process,
}

#[derive(Clone)]
struct AppState {
    kernel: PreviewKernel,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    config: Value,
}

#[derive(Debug, Serialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct FileQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
struct DiffQuery {
    path: String,
    #[serde(default)]
    unified: bool,
}

#[derive(Debug, Serialize)]
struct DiffResponse {
    #[serde(flatten)]
    diff: DiffView,
    #[serde(skip_serializing_if = "Option::is_none")]
    unified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveFileRequest {
    path: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PathRequest {
    path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypecheckSessionRequest {
    compiler_options: Option<Value>,
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiagnosticsResponse {
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    kind: String,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request".to_owned(),
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal".to_owned(),
            message: error.to_string(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SessionNotFound | ErrorKind::FileNotFound => StatusCode::NOT_FOUND,
        ErrorKind::SessionExpired => StatusCode::GONE,
        ErrorKind::NothingToUndo | ErrorKind::NothingToRedo => StatusCode::CONFLICT,
        ErrorKind::GenerationError
        | ErrorKind::FormatError
        | ErrorKind::LintError
        | ErrorKind::TypecheckError => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::SandboxViolation => StatusCode::FORBIDDEN,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl From<PreviewError> for ApiError {
    fn from(error: PreviewError) -> Self {
        let kind = error.kind();
        Self {
            status: status_for(kind),
            kind: serde_json::to_value(kind)
                .ok()
                .and_then(|value| value.as_str().map(str::to_owned))
                .unwrap_or_default(),
            message: error.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<PreviewError>() {
            Ok(error) => error.into(),
            Err(error) => Self::internal(format!("{error:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "kind": self.kind, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Worker) => run_worker(),
        None => serve(cli),
    }
}

/// Sandbox worker entry point. Logs go to stderr; stdout carries replies.
fn run_worker() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .compact()
        .init();

    let stdin = io::stdin();
    let stdout = io::stdout();
    preview_sandbox::worker::serve(stdin.lock(), stdout.lock())
}

#[tokio::main]
async fn serve(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let kernel = build_kernel(&cli)?;
    kernel.start_sweeper();

    let app = router(AppState {
        kernel: kernel.clone(),
    });

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(
        listen = %cli.listen,
        backend = ?cli.sandbox_backend,
        "preview-api listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    kernel.shutdown();
    Ok(())
}

fn build_kernel(cli: &Cli) -> Result<PreviewKernel> {
    let backend: Arc<dyn WorkerBackend> = match cli.sandbox_backend {
        BackendKind::Thread => Arc::new(ThreadBackend),
        BackendKind::Process => {
            let mut backend = ProcessBackend::current_exe(vec!["worker".to_owned()])?;
            if let Ok(filter) = std::env::var("RUST_LOG") {
                backend = backend.with_env("RUST_LOG", filter);
            }
            Arc::new(backend)
        }
    };
    Ok(KernelBuilder::new()
        .session_ttl(Duration::from_secs(cli.session_ttl_secs))
        .sweep_interval(Duration::from_secs(cli.sweep_interval_secs))
        .sandbox_limits(SandboxLimits {
            timeout_ms: cli.sandbox_timeout_ms,
            workers: cli.workers,
            max_input_bytes: cli.max_input_bytes,
        })
        .backend(backend)
        .build())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(docs))
        .route("/sessions", post(create_session))
        .route(
            "/sessions/{session_id}",
            get(session_status).delete(destroy_session),
        )
        .route("/sessions/{session_id}/tree", get(get_tree))
        .route("/sessions/{session_id}/file", get(read_file).put(save_file))
        .route("/sessions/{session_id}/diff", get(diff_file))
        .route("/sessions/{session_id}/undo", post(undo_file))
        .route("/sessions/{session_id}/redo", post(redo_file))
        .route("/sessions/{session_id}/reset", post(reset_file))
        .route("/sessions/{session_id}/typecheck", post(typecheck_session))
        .route("/sessions/{session_id}/download", get(download_session))
        .route("/format", post(format_code))
        .route("/lint", post(lint_code))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "preview-api",
        "sessions": state.kernel.session_count(),
        "sandbox": state.kernel.sandbox_stats(),
    }))
}

async fn openapi_json() -> Json<Value> {
    Json(openapi_spec())
}

async fn docs() -> Html<String> {
    Html(scalar_docs_html("/openapi.json"))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<SessionSummary>> {
    let summary = state.kernel.create_session(&request.config).await?;
    Ok(Json(summary))
}

async fn session_status(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<SessionStatus>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.kernel.session_status(&session_id)?))
}

async fn destroy_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<StatusCode> {
    let session_id = parse_session_id(&session_id)?;
    state.kernel.destroy_session(&session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_tree(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<TreeResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let tree = state.kernel.tree(&session_id)?;
    Ok(Json(TreeResponse { tree }))
}

async fn read_file(
    Path(session_id): Path<String>,
    Query(query): Query<FileQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<FileView>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.kernel.read_file(&session_id, &query.path)?))
}

async fn save_file(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SaveFileRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = parse_session_id(&session_id)?;
    state
        .kernel
        .save_file(&session_id, &request.path, request.content)?;
    Ok(Json(json!({ "ok": true })))
}

async fn diff_file(
    Path(session_id): Path<String>,
    Query(query): Query<DiffQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<DiffResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let diff = state.kernel.diff(&session_id, &query.path)?;
    let unified = if query.unified {
        Some(state.kernel.unified_diff(&session_id, &query.path)?)
    } else {
        None
    };
    Ok(Json(DiffResponse { diff, unified }))
}

async fn undo_file(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<Json<FileView>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.kernel.undo(&session_id, &request.path)?))
}

async fn redo_file(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<Json<FileView>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.kernel.redo(&session_id, &request.path)?))
}

async fn reset_file(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> ApiResult<Json<FileView>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.kernel.reset(&session_id, &request.path)?))
}

async fn typecheck_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    request: Option<Json<TypecheckSessionRequest>>,
) -> ApiResult<Json<DiagnosticsResponse>> {
    let session_id = parse_session_id(&session_id)?;
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let output = state
        .kernel
        .typecheck(&session_id, request.compiler_options)
        .await?;
    let diagnostics = match request.path.as_deref() {
        Some(raw) => {
            let path = preview_protocol::path::normalize(raw)
                .ok_or_else(|| ApiError::bad_request(format!("invalid path \"{raw}\"")))?;
            filter_by_file(output.diagnostics, &path)
        }
        None => output.diagnostics,
    };
    Ok(Json(DiagnosticsResponse { diagnostics }))
}

/// Keeps diagnostics for `path` plus project-level ones that name no file.
fn filter_by_file(diagnostics: Vec<Diagnostic>, path: &str) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .filter(|diagnostic| diagnostic.file.as_deref().is_none_or(|file| file == path))
        .collect()
}

async fn download_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let session_id = parse_session_id(&session_id)?;
    let download = state.kernel.download(&session_id)?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        download.file_name
    ))
    .map_err(ApiError::internal)?;
    let headers = [
        (CONTENT_TYPE, HeaderValue::from_static("application/zip")),
        (CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, download.bytes).into_response())
}

async fn format_code(
    State(state): State<AppState>,
    Json(request): Json<FormatRequest>,
) -> ApiResult<Json<FormatOutput>> {
    Ok(Json(state.kernel.format(request).await?))
}

async fn lint_code(
    State(state): State<AppState>,
    Json(request): Json<LintRequest>,
) -> ApiResult<Json<LintOutput>> {
    Ok(Json(state.kernel.lint(request).await?))
}

fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ApiError::bad_request("session id must not be empty"));
    }
    Ok(SessionId::from_string(raw))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_protocol::{DiagnosticSource, Severity};

    fn state() -> AppState {
        AppState {
            kernel: KernelBuilder::new().build(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(state: &AppState, files: Value) -> String {
        let Json(summary) = create_session(
            State(state.clone()),
            Json(CreateSessionRequest {
                config: json!({ "projectName": "demo", "files": files }),
            }),
        )
        .await
        .unwrap();
        summary.session_id.to_string()
    }

    fn path_request(path: &str) -> Json<PathRequest> {
        Json(PathRequest { path: path.into() })
    }

    #[test]
    fn router_builds_with_every_route() {
        let _ = router(state());
    }

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (PreviewError::SessionNotFound("s".into()), StatusCode::NOT_FOUND),
            (PreviewError::SessionExpired("s".into()), StatusCode::GONE),
            (PreviewError::FileNotFound("a".into()), StatusCode::NOT_FOUND),
            (PreviewError::NothingToUndo("a".into()), StatusCode::CONFLICT),
            (PreviewError::Generation("g".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PreviewError::Lint("l".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (PreviewError::SandboxViolation("w".into()), StatusCode::FORBIDDEN),
            (PreviewError::TimedOut { timeout_ms: 1 }, StatusCode::GATEWAY_TIMEOUT),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status, status);
        }
    }

    #[tokio::test]
    async fn error_body_carries_kind_and_message() {
        let response = ApiError::from(PreviewError::NothingToRedo("a.ts".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "nothing_to_redo");
        assert_eq!(body["error"]["message"], "nothing to redo: a.ts");
    }

    #[test]
    fn anyhow_errors_keep_their_preview_kind() {
        let error = ApiError::from(anyhow::Error::new(PreviewError::SessionExpired("s".into())));
        assert_eq!(error.status, StatusCode::GONE);
        let error = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn parse_session_id_rejects_blank_ids() {
        assert!(parse_session_id("  ").is_err());
        assert_eq!(parse_session_id("abc").unwrap().as_str(), "abc");
    }

    #[tokio::test]
    async fn edit_round_trip_over_handlers() {
        let state = state();
        let id = create(&state, json!({ "a.ts": "let x=1" })).await;

        let Json(ok) = save_file(
            Path(id.clone()),
            State(state.clone()),
            Json(SaveFileRequest {
                path: "a.ts".into(),
                content: "let x=1;".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(ok, json!({ "ok": true }));

        let Json(view) = read_file(
            Path(id.clone()),
            Query(FileQuery { path: "a.ts".into() }),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert!(view.dirty);

        let Json(view) = undo_file(Path(id.clone()), State(state.clone()), path_request("a.ts"))
            .await
            .unwrap();
        assert_eq!(view.content, "let x=1");
        assert!(view.can_redo);

        let error = undo_file(Path(id.clone()), State(state.clone()), path_request("a.ts"))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::CONFLICT);

        let Json(diff) = diff_file(
            Path(id.clone()),
            Query(DiffQuery {
                path: "a.ts".into(),
                unified: true,
            }),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert_eq!(diff.diff.original, diff.diff.current);
        assert_eq!(diff.unified.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn tree_and_status_for_session() {
        let state = state();
        let id = create(&state, json!({ "src/a.ts": "", "b.ts": "" })).await;

        let Json(tree) = get_tree(Path(id.clone()), State(state.clone()))
            .await
            .unwrap();
        let tree = serde_json::to_value(tree).unwrap();
        assert_eq!(tree["tree"][0]["type"], "dir");
        assert_eq!(tree["tree"][0]["children"][0]["path"], "src/a.ts");
        assert_eq!(tree["tree"][1]["path"], "b.ts");

        let Json(status) = session_status(Path(id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(status.total_files, 2);

        let status = destroy_session(Path(id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let error = get_tree(Path(id), State(state)).await.unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn typecheck_filters_by_path_at_the_boundary() {
        let state = state();
        let id = create(
            &state,
            json!({
                "a.ts": "const n: number = 'x';",
                "b.ts": "const s: string = 1;",
            }),
        )
        .await;

        let Json(all) = typecheck_session(Path(id.clone()), State(state.clone()), None)
            .await
            .unwrap();
        assert_eq!(all.diagnostics.len(), 2);

        let Json(only_b) = typecheck_session(
            Path(id),
            State(state),
            Some(Json(TypecheckSessionRequest {
                compiler_options: None,
                path: Some("./b.ts".into()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(only_b.diagnostics.len(), 1);
        assert_eq!(only_b.diagnostics[0].file.as_deref(), Some("b.ts"));
        assert_eq!(only_b.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn filter_keeps_project_level_diagnostics() {
        let diagnostic = |file: Option<&str>| Diagnostic {
            file: file.map(str::to_owned),
            line: 1,
            column: 1,
            message: "m".into(),
            severity: Severity::Error,
            source: DiagnosticSource::Typescript,
            code: None,
        };
        let kept = filter_by_file(
            vec![diagnostic(Some("a.ts")), diagnostic(None), diagnostic(Some("b.ts"))],
            "a.ts",
        );
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn format_and_lint_endpoints() {
        let state = state();
        let Json(output) = format_code(
            State(state.clone()),
            Json(FormatRequest {
                code: "{\"a\":1}".into(),
                language: "json".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(output.formatted, "{\n  \"a\": 1\n}\n");

        let error = format_code(
            State(state.clone()),
            Json(FormatRequest {
                code: "x".into(),
                language: "cobol".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.kind, "format_error");

        let Json(output) = lint_code(
            State(state),
            Json(LintRequest {
                code: "let x=1".into(),
                file_path: "a.ts".into(),
                fix: true,
            }),
        )
        .await
        .unwrap();
        assert!(output.fixed_code.is_some());
    }

    #[tokio::test]
    async fn download_returns_zip_attachment() {
        let state = state();
        let id = create(&state, json!({ "a.ts": "x" })).await;
        let response = download_session(Path(id), State(state)).await.unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"demo.zip\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
