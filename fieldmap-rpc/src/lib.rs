//! # Fieldmap RPC
//!
//! JSON-RPC 2.0 surface for the mapping engine, so an editor or workflow host
//! can preview resolutions and request auto-mapping proposals.
//!
//! ```text
//! Client <-> Transport (stdio/channel) <-> RpcServer <-> RequestHandler <-> MappingEngine
//! ```
//!
//! Methods: `functions/list`, `mappings/test`, `mappings/auto`.

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod transport;

use error::RpcError;
use fieldmap_core::MappingEngine;
use handlers::RequestHandler;
use protocol::{IncomingMessage, JsonRpcResponse, RequestId};
use tracing::{debug, error, info, warn};
use transport::Transport;

/// Processes JSON-RPC messages from a transport until EOF.
pub struct RpcServer {
    handler: RequestHandler,
}

impl RpcServer {
    pub fn new(engine: MappingEngine) -> Self {
        Self {
            handler: RequestHandler::new(engine),
        }
    }

    pub fn with_handler(handler: RequestHandler) -> Self {
        Self { handler }
    }

    /// Serve until the transport reports EOF or a read fails.
    pub async fn run<T: Transport>(&self, transport: &mut T) -> Result<(), RpcError> {
        info!("RPC server starting");

        loop {
            let message = match transport.read_message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    info!("Transport closed (EOF), shutting down RPC server");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Transport read error");
                    break;
                }
            };

            if message.trim().is_empty() {
                continue;
            }

            debug!(message = %message, "Received RPC message");

            let response = match self.process_message(&message).await {
                Ok(Some(response)) => response,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Error processing RPC message");
                    JsonRpcResponse::from_rpc_error(RequestId::Null, e)
                }
            };

            let response_json =
                serde_json::to_string(&response).map_err(|e| RpcError::InternalError {
                    message: format!("Failed to serialize response: {}", e),
                })?;
            debug!(response = %response_json, "Sending RPC response");
            transport.write_message(&response_json).await?;
        }

        transport.close().await?;
        info!("RPC server stopped");
        Ok(())
    }

    /// Process one raw message. Returns `None` for notifications.
    pub async fn process_message(&self, raw: &str) -> Result<Option<JsonRpcResponse>, RpcError> {
        let incoming: IncomingMessage =
            serde_json::from_str(raw).map_err(|e| RpcError::ParseError {
                message: format!("Invalid JSON-RPC message: {}", e),
            })?;

        if incoming.jsonrpc != "2.0" {
            return Err(RpcError::InvalidRequest {
                message: format!("Expected jsonrpc version 2.0, got: {}", incoming.jsonrpc),
            });
        }

        if incoming.is_notification() {
            debug!(method = %incoming.method, "Processing notification");
            if let Err(e) = self.handler.route(&incoming.method, incoming.params).await {
                warn!(method = %incoming.method, error = %e, "Notification handler error");
            }
            return Ok(None);
        }

        let id = incoming.id.unwrap_or(RequestId::Null);
        debug!(method = %incoming.method, "Processing request");
        match self.handler.route(&incoming.method, incoming.params).await {
            Ok(result) => Ok(Some(JsonRpcResponse::success(id, result))),
            Err(e) => Ok(Some(JsonRpcResponse::from_rpc_error(id, e))),
        }
    }
}
