//! HTTP side of the fabric. All protocol traffic arrives as JSON-RPC over
//! `POST /mcp`; `GET /health` and `GET /status` exist for operations.
//! Valid JSON-RPC always answers HTTP 200, carrying errors inside the
//! frame; only malformed bytes produce HTTP 400.

use crate::{
    audit::{AuditLog, Direction},
    protocol::{
        codec::{self, JsonRpcResponse, ValidatedRequest},
        Envelope, ErrorCode, RpcError, Sender, ServerError, ServerResult,
    },
};
use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use log::{error, info};
use serde_json::{json, Value};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};

/// Successful handler output: a response envelope plus payload that the
/// transport wraps into the JSON-RPC result
#[derive(Debug)]
pub struct Reply {
    pub envelope: Envelope,
    pub payload: Value,
}

impl Reply {
    pub fn new(envelope: Envelope, payload: Value) -> Self {
        Self { envelope, payload }
    }
}

/// A role-specific message dispatcher behind the shared `/mcp` endpoint
pub trait McpHandler: Send + Sync + 'static {
    /// Identity used as the audit source/destination for this process
    fn identity(&self) -> Sender;

    /// Role-specific counters served on `GET /status`
    fn status(&self) -> Value;

    fn audit(&self) -> &AuditLog;

    /// Routes one validated request to the matching operation
    fn handle(
        &self,
        request: ValidatedRequest,
    ) -> impl Future<Output = ServerResult<Reply>> + Send;

    fn role(&self) -> &'static str {
        match self.identity() {
            Sender::LeagueManager => "league_manager",
            Sender::Referee(_) => "referee",
            Sender::Player(_) => "player",
        }
    }
}

/// Builds the three-route router for a role handler
pub fn router<H: McpHandler>(handler: Arc<H>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp::<H>))
        .route("/health", get(health::<H>))
        .route("/status", get(status::<H>))
        .layer(Extension(handler))
}

async fn health<H: McpHandler>(Extension(handler): Extension<Arc<H>>) -> Json<Value> {
    Json(json!({ "role": handler.role() }))
}

async fn status<H: McpHandler>(Extension(handler): Extension<Arc<H>>) -> Json<Value> {
    Json(handler.status())
}

async fn handle_mcp<H: McpHandler>(
    Extension(handler): Extension<Arc<H>>,
    body: Bytes,
) -> Response {
    let identity = handler.identity().to_string();

    // Step 1: bytes must parse as JSON at all, otherwise HTTP 400 with the
    // raw body preserved in the audit trail
    let frame: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            if let Err(err) = handler.audit().record_raw_body(&identity, &body) {
                error!("Failed to audit unparsable request body: {err}");
            }
            let response = JsonRpcResponse::failure(
                Value::Null,
                RpcError::new(ErrorCode::ParseError, "request body is not valid JSON"),
            );
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let id = codec::request_id(&frame);

    // Steps 2..9 of the validation order
    let request = match codec::validate_request(&frame) {
        Ok(value) => value,
        Err(rpc_error) => {
            let response = JsonRpcResponse::failure(id, rpc_error);
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    let source = request.envelope.sender.to_string();
    let conversation_id = request.envelope.conversation_id;
    let message_type = request.envelope.message_type;

    // Validated inbound frames are audited before any handler state can
    // change; refusing the request on audit failure keeps the audit log a
    // superset of the commits
    if let Err(err) =
        handler
            .audit()
            .record(Direction::Request, &source, &identity, Some(conversation_id), &frame)
    {
        error!("Failed to audit inbound frame: {err}");
        let response = JsonRpcResponse::failure(
            id,
            ServerError::Internal {
                reason: err.to_string(),
            }
            .to_rpc_error(None),
        );
        return (StatusCode::OK, Json(response)).into_response();
    }

    let response = match handler.handle(request).await {
        Ok(reply) => JsonRpcResponse::success(id, reply.envelope, reply.payload),
        Err(err) => {
            let rpc_error = err
                .to_rpc_error(None)
                .with_context(Some(&conversation_id.to_string()), Some(message_type.as_str()));
            JsonRpcResponse::failure(id, rpc_error)
        }
    };

    // Outbound frames are audited as well; at this point the response is
    // committed either way, so a failed append is only logged
    match serde_json::to_value(&response) {
        Ok(frame) => {
            if let Err(err) = handler.audit().record(
                Direction::Response,
                &identity,
                &source,
                Some(conversation_id),
                &frame,
            ) {
                error!("Failed to audit outbound frame: {err}");
            }
        }
        Err(err) => error!("Failed to serialize response for audit: {err}"),
    }

    (StatusCode::OK, Json(response)).into_response()
}

/// Binds the listener and runs the server until ctrl-c
pub async fn serve(addr: SocketAddr, router: Router) {
    let listener = match TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to bind HTTP server on {}: {:?}", addr, err);
            return;
        }
    };

    info!("Listening on {}", addr);

    if let Err(err) = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        _ = signal::ctrl_c().await;
    })
    .await
    {
        error!("Error within HTTP server {:?}", err);
    }
}
