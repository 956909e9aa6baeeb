// Operation registry
//
// An explicit table of { name, handler } entries built at startup. Dispatch
// parses the caller's JSON into the operation's typed request, validates at
// call time, runs the handler, and wraps any error into the response
// envelope. No reflection, no attribute scanning.

mod handlers;
mod requests;
mod responses;

pub use requests::*;
pub use responses::{ErrorBody, OperationResponse};

use crate::workspace::QuarryWorkspace;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

type HandlerFuture = Pin<Box<dyn Future<Output = OperationResponse> + Send>>;
type Handler = Arc<dyn Fn(Arc<QuarryWorkspace>, serde_json::Value) -> HandlerFuture + Send + Sync>;

pub struct Operation {
    pub name: &'static str,
    handler: Handler,
}

pub struct OperationRegistry {
    operations: Vec<Operation>,
}

fn parse_request<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, OperationResponse> {
    serde_json::from_value(value).map_err(|e| {
        OperationResponse::from_error(&crate::error::EngineError::Validation {
            reason: format!("malformed request: {e}"),
        })
    })
}

fn envelope(result: crate::error::EngineResult<OperationResponse>) -> OperationResponse {
    match result {
        Ok(response) => response,
        Err(error) => OperationResponse::from_error(&error),
    }
}

/// Registers a handler that takes a typed request
macro_rules! op {
    ($name:literal, $handler:path) => {
        Operation {
            name: $name,
            handler: Arc::new(|engine, value| {
                Box::pin(async move {
                    match parse_request(value) {
                        Ok(request) => envelope($handler(engine, request).await),
                        Err(response) => response,
                    }
                })
            }),
        }
    };
}

/// Registers a handler that takes no request body
macro_rules! op_noargs {
    ($name:literal, $handler:path) => {
        Operation {
            name: $name,
            handler: Arc::new(|engine, _value| {
                Box::pin(async move { envelope($handler(engine).await) })
            }),
        }
    };
}

impl OperationRegistry {
    /// The full operation table. Adding an operation is one line here plus
    /// its handler and request struct.
    pub fn new() -> Self {
        let operations = vec![
            op!("index_workspace", handlers::index_workspace),
            op!("text_search", handlers::text_search),
            op!("symbol_search", handlers::symbol_search),
            op!("file_search", handlers::file_search),
            op!("recent_files", handlers::recent_files),
            op!("similar_files", handlers::similar_files),
            op!("directory_search", handlers::directory_search),
            op!("file_size_analysis", handlers::file_size_analysis),
            op!("goto_definition", handlers::goto_definition),
            op!("find_references", handlers::find_references),
            op!("resolve_detail", handlers::resolve_detail),
            op_noargs!("index_health", handlers::index_health),
            op_noargs!("system_health", handlers::system_health),
        ];
        Self { operations }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name).collect()
    }

    /// Run one operation by name
    pub async fn dispatch(
        &self,
        engine: Arc<QuarryWorkspace>,
        name: &str,
        args: serde_json::Value,
    ) -> OperationResponse {
        let Some(operation) = self.operations.iter().find(|op| op.name == name) else {
            return OperationResponse::from_error(&crate::error::EngineError::NotFound {
                what: format!("operation '{name}'"),
            });
        };
        debug!("Dispatching operation {}", name);
        (operation.handler)(engine, args).await
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
