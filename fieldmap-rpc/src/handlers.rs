//! Request handlers: route JSON-RPC methods to the mapping engine.

use crate::error::RpcError;
use crate::protocol::{
    AutoMapParams, METHOD_FUNCTIONS_LIST, METHOD_MAPPINGS_AUTO, METHOD_MAPPINGS_TEST,
    TestMappingsParams,
};
use fieldmap_core::MappingEngine;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Handles engine requests by delegating to a [`MappingEngine`].
pub struct RequestHandler {
    engine: MappingEngine,
    concurrent: bool,
}

impl RequestHandler {
    pub fn new(engine: MappingEngine) -> Self {
        Self {
            engine,
            concurrent: false,
        }
    }

    /// Resolve `mappings/test` fields concurrently, each under the configured field timeout.
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    pub fn engine(&self) -> &MappingEngine {
        &self.engine
    }

    /// Handle `functions/list`.
    pub fn handle_functions_list(&self) -> Result<Value, RpcError> {
        let list = self.engine.list_functions();
        debug!(
            built_in = list.built_in.len(),
            custom = list.custom.len(),
            "Listing functions"
        );
        to_value(&list)
    }

    /// Handle `mappings/test`.
    pub async fn handle_mappings_test(&self, params: TestMappingsParams) -> Result<Value, RpcError> {
        info!(
            fields = params.mappings.len(),
            sources = params.context.source_outputs.len(),
            concurrent = self.concurrent,
            "Testing mappings"
        );
        let result = if self.concurrent {
            self.engine
                .resolve_all_concurrent(params.mappings, Arc::new(params.context))
                .await?
        } else {
            self.engine.test_mappings(&params.mappings, &params.context)?
        };
        to_value(&result)
    }

    /// Handle `mappings/auto`.
    pub fn handle_mappings_auto(&self, params: AutoMapParams) -> Result<Value, RpcError> {
        let proposals = self
            .engine
            .auto_map(&params.target_fields, &params.context, &params.existing);
        to_value(&proposals)
    }

    /// Route a method call to its handler.
    pub async fn route(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            METHOD_FUNCTIONS_LIST => self.handle_functions_list(),
            METHOD_MAPPINGS_TEST => {
                let params = parse_params(method, params)?;
                self.handle_mappings_test(params).await
            }
            METHOD_MAPPINGS_AUTO => {
                let params = parse_params(method, params)?;
                self.handle_mappings_auto(params)
            }
            _ => Err(RpcError::MethodNotFound {
                method: method.to_string(),
            }),
        }
    }
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParams {
        message: format!("Invalid {} params: {}", method, e),
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError {
        message: format!("Failed to serialize result: {}", e),
    })
}
