//! StripeIO Gateway - HTTP Object Gateway
//!
//! This binary exposes a directory-backed object store over plain HTTP:
//! PUT uploads a body into an object, GET streams it back, HEAD reports
//! its size and an attributes endpoint returns the layout as JSON.

use anyhow::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use stripeio_common::{EngineConfig, Error, ObjectId, StoreConfig};
use stripeio_engine::{FsBackend, Session};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stripeio-gateway")]
#[command(about = "StripeIO HTTP Object Gateway")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:9300")]
    listen: String,

    /// Store data directory
    #[arg(short, long, default_value = "./stripeio-data", env = "STRIPEIO_DATA_DIR")]
    data_dir: PathBuf,

    /// Number of concurrent block operations per transfer
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    max_body: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone)]
struct AppState {
    session: Arc<Session>,
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::InvalidId(_) | Error::InvalidSeek(_) => StatusCode::BAD_REQUEST,
        Error::AlreadyOpen(_) | Error::PoolMismatch { .. } => StatusCode::CONFLICT,
        Error::Backend(msg) if msg.starts_with("no such object") => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

fn parse_id(raw: &str) -> Result<ObjectId, Response> {
    raw.parse::<ObjectId>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())
}

async fn put_object(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result: stripeio_common::Result<()> = async {
        let mut stream = state.session.create(id, body.len() as u64, None).await?;
        stream.write(&body).await?;
        stream.close().await?;
        Ok(())
    }
    .await;
    match result {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_object(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result: stripeio_common::Result<Vec<u8>> = async {
        let mut stream = state.session.open(id, None).await?;
        let mut out = Vec::with_capacity(stream.known_size() as usize);
        let mut buf = vec![0u8; 8 * 1024 * 1024];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        stream.close().await?;
        Ok(out)
    }
    .await;
    match result {
        Ok(data) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            data,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn head_object(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result: stripeio_common::Result<u64> = async {
        let mut stream = state.session.open(id, None).await?;
        let size = stream.known_size();
        stream.close().await?;
        Ok(size)
    }
    .await;
    match result {
        Ok(size) => (
            StatusCode::OK,
            [(header::CONTENT_LENGTH, size.to_string())],
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn get_attrs(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let result: stripeio_common::Result<serde_json::Value> = async {
        let mut stream = state.session.open(id, None).await?;
        let obj = *stream.object();
        let geom = *stream.geometry();
        let size = stream.known_size();
        stream.close().await?;
        Ok(serde_json::json!({
            "id": id.to_string(),
            "pool": obj.pool.to_string(),
            "layout": obj.layout,
            "size": size,
            "unit_size": geom.unit_size,
            "data_units": geom.data_units,
            "parity_units": geom.parity_units,
            "spare_units": geom.spare_units,
            "pool_width": geom.pool_width,
            "group_size": geom.group_size(),
            "max_block": geom.max_block(),
        }))
    }
    .await;
    match result {
        Ok(attrs) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            attrs.to_string(),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting StripeIO Gateway");
    info!("Data directory: {}", args.data_dir.display());

    let store = StoreConfig {
        data_dir: args.data_dir.clone(),
        ..StoreConfig::default()
    };
    let backend = Arc::new(FsBackend::new(store).await?);
    let config = EngineConfig {
        threads: args.threads,
        ..EngineConfig::default()
    };
    let state = AppState {
        session: Arc::new(Session::new(backend, config)?),
    };

    let app = Router::new()
        .route(
            "/objects/{id}",
            get(get_object).put(put_object).head(head_object),
        )
        .route("/objects/{id}/attrs", get(get_attrs))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(args.max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
