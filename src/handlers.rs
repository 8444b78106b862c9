// This module exposes the HTTP surface for integration testing
// In production, these are only used from main.rs

use std::path::PathBuf;
use std::sync::Arc;

use hyper::body::HttpBody;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use hyper::{Body, Method, Request, Response, StatusCode};
use tracing::{error, info};

use crate::application::{
    ApiResponse, PipelinePolicy, ResponseCode, ResponseData, SubmitRequest, SubmitUseCase,
};
use crate::domain::IdentityPolicy;
use crate::infrastructure::config::{Config, CredentialProvider, StoreBackend};
use crate::infrastructure::ledger::{Ledger, SqliteLedger};
use crate::infrastructure::mailer::{GmailRelay, Notifier};
use crate::infrastructure::render::{DocumentRenderer, PdfRenderer};
use crate::infrastructure::storage::{ArtifactStore, DriveStore, LocalDirStore};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared per-process state: configuration plus the long-lived pipeline
/// collaborators. The ledger is opened per request, so the context stays
/// `Send + Sync` without a connection pool.
pub struct AppContext {
    pub config: Config,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub store: Arc<dyn ArtifactStore>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub credentials: Arc<CredentialProvider>,
    /// Set when the local store backend serves `/files/{name}`.
    pub files_dir: Option<PathBuf>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let credentials = Arc::new(CredentialProvider::new(config.token_source.clone()));
        let renderer: Arc<dyn DocumentRenderer> =
            Arc::new(PdfRenderer::new(config.font_path.as_deref())?);

        let (store, files_dir): (Arc<dyn ArtifactStore>, Option<PathBuf>) = match config.store {
            StoreBackend::Local => (
                Arc::new(LocalDirStore::new(
                    config.uploads_dir.clone(),
                    config.public_base_url.clone(),
                )),
                Some(config.uploads_dir.clone()),
            ),
            StoreBackend::Drive => {
                let folder_id = config
                    .drive_folder_id
                    .clone()
                    .ok_or("drive store requires a folder id")?;
                (
                    Arc::new(DriveStore::new(
                        config.drive_api_base.clone(),
                        config.drive_view_base.clone(),
                        folder_id,
                        Arc::clone(&credentials),
                    )),
                    None,
                )
            }
        };

        let notifier: Option<Arc<dyn Notifier>> = config.gmail_api_base.clone().map(|base| {
            Arc::new(GmailRelay::new(base, Arc::clone(&credentials))) as Arc<dyn Notifier>
        });

        Ok(Self {
            config,
            renderer,
            store,
            notifier,
            credentials,
            files_dir,
        })
    }

    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            identity: IdentityPolicy::new(self.config.allowed_domains.clone()),
            rules: crate::domain::ValidationRules {
                id_prefixes: self.config.id_prefixes.clone(),
            },
            item_category: self.config.item_category.clone(),
            tz: self.config.tz,
            call_timeout: self.config.call_timeout,
        }
    }
}

pub async fn handle_request(ctx: Arc<AppContext>, request: Request<Body>) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => preflight_response(),
        (&Method::POST, "/api/submit") => handle_submit(&ctx, request).await,
        (&Method::GET, "/api/health") => handle_health(&ctx),
        (&Method::GET, "/api/auth") => handle_auth(&ctx),
        (&Method::GET, _) if path.starts_with("/files/") => {
            handle_file(&ctx, path.trim_start_matches("/files/"))
        }
        _ => not_found(),
    };

    with_cors(response)
}

async fn handle_submit(ctx: &AppContext, request: Request<Body>) -> Response<Body> {
    let body = match read_body_bounded(request).await {
        Ok(body) => body,
        Err(response) => return response,
    };

    let submit_request: SubmitRequest = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            info!(error = %e, "unparseable submit body");
            return envelope(ApiResponse::error(
                ResponseCode::TotalUnknown,
                "無法解析請求內容",
            ));
        }
    };

    let ledger = match SqliteLedger::open(&ctx.config.ledger_path) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!(error = %e, path = %ctx.config.ledger_path, "ledger unavailable");
            return envelope(ApiResponse::error(
                ResponseCode::ToolError,
                "儲存檔案時發生錯誤: 無法開啟簽收紀錄",
            ));
        }
    };

    let usecase = SubmitUseCase::new(
        Box::new(ledger),
        Arc::clone(&ctx.renderer),
        Arc::clone(&ctx.store),
        ctx.notifier.clone(),
        ctx.policy(),
    );

    match usecase.execute(submit_request).await {
        Ok(receipt) => envelope(ApiResponse::ok(
            "簽收完成，PDF已上傳並寄送至您的信箱",
            ResponseData {
                url: Some(receipt.url),
                file_id: Some(receipt.file_id),
                hash: Some(receipt.hash),
                ..ResponseData::default()
            },
        )),
        Err(e) => {
            let (code, message, data) = e.into_parts();
            let mut response = ApiResponse::error(code, message);
            if let Some(data) = data {
                response = response.with_data(data);
            }
            envelope(response)
        }
    }
}

/// Read the request body without buffering more than `MAX_BODY_BYTES`.
/// A declared oversize Content-Length is rejected before reading; an
/// undeclared one aborts as soon as the accumulated chunks cross the
/// limit.
async fn read_body_bounded(request: Request<Body>) -> Result<Vec<u8>, Response<Body>> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if matches!(declared, Some(len) if len > MAX_BODY_BYTES) {
        return Err(envelope(ApiResponse::error(
            ResponseCode::ValidationError,
            "請求內容過大",
        )));
    }

    let mut body = request.into_body();
    let mut bytes = Vec::with_capacity(declared.unwrap_or(0).min(MAX_BODY_BYTES));
    while let Some(chunk) = body.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                return Err(envelope(ApiResponse::error(
                    ResponseCode::TotalUnknown,
                    format!("無法讀取請求內容: {e}"),
                )))
            }
        };
        if bytes.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(envelope(ApiResponse::error(
                ResponseCode::ValidationError,
                "請求內容過大",
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn handle_health(ctx: &AppContext) -> Response<Body> {
    let payload = match SqliteLedger::open(&ctx.config.ledger_path)
        .and_then(|ledger| ledger.count_entries())
    {
        Ok(entries) => serde_json::json!({ "status": "ok", "entries": entries }),
        Err(e) => {
            error!(error = %e, "health check found ledger unavailable");
            serde_json::json!({ "status": "degraded", "error": e.to_string() })
        }
    };
    json_response(StatusCode::OK, payload.to_string().into_bytes())
}

/// Kick off the operator-side OAuth delegation. The service only issues
/// the redirect; the exchange happens out of band and its result comes
/// back as a token blob in configuration.
fn handle_auth(ctx: &AppContext) -> Response<Body> {
    let (client_id, redirect_uri) = match (
        ctx.config.oauth_client_id.as_deref(),
        ctx.config.oauth_redirect_uri.as_deref(),
    ) {
        (Some(client_id), Some(redirect_uri)) => (client_id, redirect_uri),
        _ => {
            return envelope(ApiResponse::error(
                ResponseCode::ToolError,
                "尚未設定 OAuth 用戶端",
            ));
        }
    };

    let scope = "https://www.googleapis.com/auth/drive.file \
                 https://www.googleapis.com/auth/gmail.send";
    let location = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        ctx.config.oauth_auth_base,
        encode_query(client_id),
        encode_query(redirect_uri),
        encode_query(scope),
    );

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
}

fn handle_file(ctx: &AppContext, name: &str) -> Response<Body> {
    let dir = match &ctx.files_dir {
        Some(dir) => dir,
        None => return not_found(),
    };
    // Artifact names carry non-ASCII characters, which arrive
    // percent-encoded in the request path.
    let name = match decode_path(name) {
        Some(name) => name,
        None => return not_found(),
    };
    let name = match LocalDirStore::sanitized(&name) {
        Some(name) => name,
        None => return not_found(),
    };
    match std::fs::read(dir.join(name)) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
            response
        }
        Err(_) => not_found(),
    }
}

fn envelope(response: ApiResponse) -> Response<Body> {
    let body = serde_json::to_vec(&response)
        .unwrap_or_else(|_| br#"{"code":"TOTAL_UNKNOWN","message":"encode failure"}"#.to_vec());
    json_response(StatusCode::OK, body)
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::from("not found"));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

/// The form is served from a different origin than the API.
fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
    response
}

/// Decode a percent-encoded path segment into UTF-8.
fn decode_path(segment: &str) -> Option<String> {
    let raw = segment.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Percent-encode a query component. Unreserved characters pass through.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
