//! Hub IPC server
//!
//! Listens on `<workspace>/.devac/mcp.sock`. Each connection is served by
//! its own task; within a connection requests run one at a time in arrival
//! order. Every request is bounded by a timeout so one slow query cannot
//! wedge a consumer.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::config;
use crate::error::HubError;
use crate::hub::{CentralHub, QueryOptions};
use crate::protocol::{
    self, PingResult, PushValidationErrorsParams, QueryParams, QueryResultWire, RefreshParams,
    RegisterParams, RegisterResult, Request, Response,
};

pub struct HubServer {
    hub: Arc<RwLock<CentralHub>>,
    socket_path: PathBuf,
    request_timeout: Duration,
}

impl HubServer {
    pub fn new(hub: CentralHub) -> Self {
        let socket_path = config::socket_path(hub.workspace_root());
        HubServer {
            hub: Arc::new(RwLock::new(hub)),
            socket_path,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Bind the socket and serve until the task is dropped.
    ///
    /// A socket file with no listener is a stale artifact of a crashed
    /// server; it is removed before binding. A live listener means another
    /// hub owns this workspace.
    pub async fn serve(self) -> Result<(), HubError> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => {
                    return Err(HubError::Ipc(format!(
                        "another hub is already listening on {}",
                        self.socket_path.display()
                    )));
                }
                Err(_) => {
                    debug!("removing stale socket {}", self.socket_path.display());
                    std::fs::remove_file(&self.socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("hub listening on {}", self.socket_path.display());

        loop {
            let (stream, _) = listener.accept().await?;
            let hub = Arc::clone(&self.hub);
            let timeout = self.request_timeout;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, hub, timeout).await {
                    debug!("connection closed: {e}");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    hub: Arc<RwLock<CentralHub>>,
    timeout: Duration,
) -> Result<(), HubError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| HubError::Ipc(e.to_string()))?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let id = request.id;
                let hub = Arc::clone(&hub);
                let work = tokio::task::spawn_blocking(move || dispatch(&hub, request));
                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(response)) => response,
                    Ok(Err(join_error)) => Response::fail(
                        id,
                        protocol::CODE_INTERNAL,
                        format!("request task failed: {join_error}"),
                    ),
                    Err(_) => Response::fail(id, protocol::CODE_TIMEOUT, "request timed out"),
                }
            }
            Err(e) => Response::fail(0, protocol::CODE_PARSE_ERROR, format!("bad frame: {e}")),
        };

        let mut frame = serde_json::to_vec(&response)
            .map_err(|e| HubError::Internal(format!("response encode: {e}")))?;
        frame.push(b'\n');
        write_half
            .write_all(&frame)
            .await
            .map_err(|e| HubError::Ipc(e.to_string()))?;
    }
    Ok(())
}

fn dispatch(hub: &RwLock<CentralHub>, request: Request) -> Response {
    let id = request.id;
    let outcome = match request.method.as_str() {
        "ping" => Ok(serde_json::to_value(PingResult {
            server_version: protocol::SERVER_VERSION.to_string(),
            protocol_version: protocol::PROTOCOL_VERSION.to_string(),
        })
        .unwrap_or(Value::Null)),
        "query" => run_query(hub, request.params),
        "listRepos" => {
            let hub = hub.read().unwrap_or_else(|p| p.into_inner());
            serde_json::to_value(hub.list_repos())
                .map_err(|e| HubError::Internal(e.to_string()))
        }
        "register" => run_register(hub, request.params),
        "refresh" => {
            let params: RefreshParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return fail_with(id, e),
            };
            let mut hub = hub.write().unwrap_or_else(|p| p.into_inner());
            hub.refresh_repo(&params.repo_id)
                .and_then(|r| {
                    serde_json::to_value(r).map_err(|e| HubError::Internal(e.to_string()))
                })
        }
        "pushValidationErrors" => {
            let params: PushValidationErrorsParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return fail_with(id, e),
            };
            let hub = hub.read().unwrap_or_else(|p| p.into_inner());
            hub.push_validation_errors(&params.repo_id, &params.package_path, params.errors)
                .map(|_| Value::Null)
        }
        other => Err(HubError::Input(format!("unknown method {other}"))),
    };

    match outcome {
        Ok(result) => Response::ok(id, result),
        Err(HubError::Input(message)) if message.starts_with("unknown method") => {
            Response::fail(id, protocol::CODE_UNKNOWN_METHOD, message)
        }
        Err(e) => fail_with(id, e),
    }
}

fn fail_with(id: u64, error: HubError) -> Response {
    warn!("request {id} failed: {error}");
    Response::fail(id, protocol::error_code_for(&error), error.to_string())
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, HubError> {
    serde_json::from_value(params).map_err(|e| HubError::Input(format!("bad params: {e}")))
}

fn run_query(hub: &RwLock<CentralHub>, params: Value) -> Result<Value, HubError> {
    let params: QueryParams = parse_params(params)?;
    let options = QueryOptions {
        branch: params.branch,
        packages: params.packages,
    };
    let hub = hub.read().unwrap_or_else(|p| p.into_inner());
    let output = hub.query(&params.sql, &options)?;
    serde_json::to_value(QueryResultWire {
        rows: output.rows,
        row_count: output.row_count,
        time_ms: output.time_ms,
    })
    .map_err(|e| HubError::Internal(e.to_string()))
}

fn run_register(hub: &RwLock<CentralHub>, params: Value) -> Result<Value, HubError> {
    let params: RegisterParams = parse_params(params)?;
    let mut hub = hub.write().unwrap_or_else(|p| p.into_inner());
    let summary = hub.register_repo(std::path::Path::new(&params.repo_path))?;

    // Edge total across the repo's packages, for the registration report.
    let edges = hub
        .query(
            "SELECT count(*) AS n FROM edges@*",
            &QueryOptions::default(),
        )
        .ok()
        .and_then(|out| {
            out.rows
                .first()
                .and_then(|r| r.get("n"))
                .and_then(|v| v.as_u64())
        })
        .unwrap_or(0) as usize;

    serde_json::to_value(RegisterResult {
        repo_id: summary.repo_id,
        packages: summary.packages,
        edges,
    })
    .map_err(|e| HubError::Internal(e.to_string()))
}
