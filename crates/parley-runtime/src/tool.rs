use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::ToolError;
use crate::protocol::ToolSchema;

/// Async Tool trait
/// Note: Uses async_trait for trait object compatibility with registry storage
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute with positional arguments, returns the result text fed back to the backend
    async fn execute(&self, argv: Vec<String>) -> Result<String, ToolError>;

    /// Schema advertised to the backend; `schema().name` is the registry key
    fn schema(&self) -> ToolSchema;

    /// Parameter names in the order `execute` expects them
    fn argument_order(&self) -> Vec<String>;
}

type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

/// Tool backed by a closure, for small or test tools
pub struct FnTool {
    schema: ToolSchema,
    argument_order: Vec<String>,
    func: Box<dyn Fn(Vec<String>) -> BoxedToolFuture + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(schema: ToolSchema, argument_order: &[&str], func: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            schema,
            argument_order: argument_order.iter().map(|s| s.to_string()).collect(),
            func: Box::new(move |argv| Box::pin(func(argv))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    async fn execute(&self, argv: Vec<String>) -> Result<String, ToolError> {
        (self.func)(argv).await
    }

    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    fn argument_order(&self) -> Vec<String> {
        self.argument_order.clone()
    }
}
