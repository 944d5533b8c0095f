//! Consumer-side hub routing
//!
//! One hub process per workspace, shared over the socket. The routing
//! contract:
//!
//! 1. no socket file → in-process hub;
//! 2. socket file present → connect with a bounded timeout and ping;
//! 3. ping success → route calls over the socket;
//! 4. any connect/ping/request failure → fall back to the in-process hub
//!    and continue. The stale socket file is never deleted by a client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info};

use crate::config;
use crate::error::HubError;
use crate::hub::{CentralHub, QueryOptions, RefreshReport, RepoSummary};
use crate::protocol::{
    self, PingResult, QueryParams, QueryResultWire, Request, Response,
};
use crate::query::QueryOutput;

struct SocketConn {
    writer: OwnedWriteHalf,
    lines: Lines<BufReader<OwnedReadHalf>>,
    next_id: u64,
    request_timeout: Duration,
}

impl SocketConn {
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, HubError> {
        self.next_id += 1;
        let request = Request {
            id: self.next_id,
            method: method.to_string(),
            params,
        };
        let mut frame = serde_json::to_vec(&request)
            .map_err(|e| HubError::Internal(format!("request encode: {e}")))?;
        frame.push(b'\n');

        let exchange = async {
            self.writer
                .write_all(&frame)
                .await
                .map_err(|e| HubError::Ipc(format!("socket write: {e}")))?;
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| HubError::Ipc(format!("socket read: {e}")))?
                .ok_or_else(|| HubError::Ipc("server closed the connection".to_string()))?;
            let response: Response = serde_json::from_str(&line)
                .map_err(|e| HubError::Ipc(format!("malformed reply: {e}")))?;
            if response.id != request.id {
                return Err(HubError::Ipc(format!(
                    "reply id {} does not match request id {}",
                    response.id, request.id
                )));
            }
            match (response.result, response.error) {
                (Some(result), None) => Ok(result),
                (_, Some(error)) => Err(HubError::Ipc(format!(
                    "server error {}: {}",
                    error.code, error.message
                ))),
                (None, None) => Ok(Value::Null),
            }
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| HubError::Ipc("request timed out".to_string()))?
    }
}

enum Route {
    Socket(SocketConn),
    Direct(Box<CentralHub>),
}

pub struct HubClient {
    workspace_root: PathBuf,
    route: Route,
}

impl HubClient {
    /// Route to the shared hub per the contract above. Never fails because
    /// of socket problems; those degrade to direct mode.
    pub async fn connect(workspace_root: impl Into<PathBuf>) -> Result<Self, HubError> {
        Self::connect_with_timeout(workspace_root, Duration::from_secs(1)).await
    }

    pub async fn connect_with_timeout(
        workspace_root: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> Result<Self, HubError> {
        let workspace_root = workspace_root.into();
        let socket = config::socket_path(&workspace_root);

        if socket.exists() {
            match try_socket(&socket, connect_timeout).await {
                Ok(conn) => {
                    info!("routing through hub socket {}", socket.display());
                    return Ok(HubClient {
                        workspace_root,
                        route: Route::Socket(conn),
                    });
                }
                Err(e) => {
                    // A socket file with no listener is a crashed server's
                    // leftover; keep the file, use direct mode.
                    debug!("socket unusable ({e}); falling back to direct hub");
                }
            }
        }

        let hub = CentralHub::new(&workspace_root)?;
        Ok(HubClient {
            workspace_root,
            route: Route::Direct(Box::new(hub)),
        })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.route, Route::Direct(_))
    }

    pub async fn query(
        &mut self,
        sql: &str,
        options: &QueryOptions,
    ) -> Result<QueryOutput, HubError> {
        let params = serde_json::to_value(QueryParams {
            sql: sql.to_string(),
            packages: options.packages.clone(),
            branch: options.branch.clone(),
        })
        .map_err(|e| HubError::Internal(e.to_string()))?;

        match self.call("query", params).await? {
            CallOutcome::Remote(value) => {
                let wire: QueryResultWire = serde_json::from_value(value)
                    .map_err(|e| HubError::Ipc(format!("malformed query result: {e}")))?;
                Ok(QueryOutput {
                    rows: wire.rows,
                    row_count: wire.row_count,
                    time_ms: wire.time_ms,
                    views_created: Vec::new(),
                    warnings: Vec::new(),
                })
            }
            CallOutcome::Local(hub) => hub.query(sql, options),
        }
    }

    pub async fn list_repos(&mut self) -> Result<Vec<RepoSummary>, HubError> {
        match self.call("listRepos", Value::Null).await? {
            CallOutcome::Remote(value) => serde_json::from_value(value)
                .map_err(|e| HubError::Ipc(format!("malformed repo list: {e}"))),
            CallOutcome::Local(hub) => Ok(hub.list_repos()),
        }
    }

    pub async fn register(&mut self, repo_path: &Path) -> Result<RepoSummary, HubError> {
        let params = serde_json::json!({ "repoPath": repo_path.display().to_string() });
        match self.call("register", params).await? {
            CallOutcome::Remote(value) => {
                let result: protocol::RegisterResult = serde_json::from_value(value)
                    .map_err(|e| HubError::Ipc(format!("malformed register result: {e}")))?;
                Ok(RepoSummary {
                    repo_id: result.repo_id.clone(),
                    name: result.repo_id,
                    packages: result.packages,
                })
            }
            CallOutcome::Local(hub) => hub.register_repo(repo_path),
        }
    }

    pub async fn refresh(&mut self, repo_id: &str) -> Result<RefreshReport, HubError> {
        let params = serde_json::json!({ "repoId": repo_id });
        match self.call("refresh", params).await? {
            CallOutcome::Remote(value) => serde_json::from_value(value)
                .map_err(|e| HubError::Ipc(format!("malformed refresh result: {e}"))),
            CallOutcome::Local(hub) => hub.refresh_repo(repo_id),
        }
    }

    pub async fn push_validation_errors(
        &mut self,
        repo_id: &str,
        package_path: &str,
        errors: Vec<Value>,
    ) -> Result<(), HubError> {
        let params = serde_json::json!({
            "repoId": repo_id,
            "packagePath": package_path,
            "errors": errors,
        });
        match self.call("pushValidationErrors", params).await? {
            CallOutcome::Remote(_) => Ok(()),
            CallOutcome::Local(hub) => {
                hub.push_validation_errors(repo_id, package_path, errors)
            }
        }
    }

    /// Run one call over the current route. A socket failure mid-request
    /// permanently demotes this client to direct mode; the caller's request
    /// is then served locally.
    async fn call(&mut self, method: &str, params: Value) -> Result<CallOutcome<'_>, HubError> {
        if let Route::Socket(conn) = &mut self.route {
            match conn.call(method, params).await {
                Ok(value) => return Ok(CallOutcome::Remote(value)),
                Err(e) => {
                    debug!("socket call failed ({e}); falling back to direct hub");
                    let hub = CentralHub::new(&self.workspace_root)?;
                    self.route = Route::Direct(Box::new(hub));
                }
            }
        }
        match &mut self.route {
            Route::Direct(hub) => Ok(CallOutcome::Local(hub)),
            Route::Socket(_) => unreachable!("socket route handled above"),
        }
    }
}

enum CallOutcome<'a> {
    /// The socket answered; here is the raw result value.
    Remote(Value),
    /// Direct mode; the caller should invoke the hub itself.
    Local(&'a mut CentralHub),
}

/// Connect and ping within the timeout, verifying protocol compatibility.
async fn try_socket(socket: &Path, timeout: Duration) -> Result<SocketConn, HubError> {
    let stream = tokio::time::timeout(timeout, UnixStream::connect(socket))
        .await
        .map_err(|_| HubError::Ipc("connect timed out".to_string()))?
        .map_err(|e| HubError::Ipc(format!("connect failed: {e}")))?;

    let (read_half, writer) = stream.into_split();
    let mut conn = SocketConn {
        writer,
        lines: BufReader::new(read_half).lines(),
        next_id: 0,
        request_timeout: timeout,
    };

    let pong: PingResult = serde_json::from_value(conn.call("ping", Value::Null).await?)
        .map_err(|e| HubError::Ipc(format!("malformed ping reply: {e}")))?;
    let ours = protocol::protocol_major(protocol::PROTOCOL_VERSION);
    let theirs = protocol::protocol_major(&pong.protocol_version);
    if ours != theirs {
        return Err(HubError::Ipc(format!(
            "protocol major mismatch: server {} vs client {}",
            pong.protocol_version,
            protocol::PROTOCOL_VERSION
        )));
    }

    // Real requests get a longer timeout than the handshake.
    conn.request_timeout = Duration::from_secs(30);
    Ok(conn)
}
