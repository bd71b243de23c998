use crate::api::{ToolCall, ToolResult};
use crate::dispatch::Dispatcher;
use crate::registry::ToolDefinition;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::*,
    service::RequestContext,
};
use std::sync::Arc;

/// MCP surface over a [`Dispatcher`]. Tools are advertised straight from the
/// registry, so `tools/list` and dispatch can never disagree.
#[derive(Clone)]
pub struct CrmServer {
    dispatcher: Arc<Dispatcher>,
}

impl CrmServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn tools(&self) -> Vec<Tool> {
        self.dispatcher
            .registry()
            .definitions()
            .map(tool_from_definition)
            .collect()
    }
}

fn tool_from_definition(def: &ToolDefinition) -> Tool {
    Tool::new(
        def.name.clone(),
        def.description.clone(),
        Arc::new(def.json_schema()),
    )
}

/// Both variants travel as structured content; failures also set `is_error`
/// so clients that ignore structured content still see the outcome.
fn into_call_result(result: ToolResult) -> Result<CallToolResult, McpError> {
    let failed = !result.is_success();
    let value = serde_json::to_value(&result)
        .map_err(|e| McpError::internal_error(format!("failed to encode tool result: {e}"), None))?;
    Ok(if failed {
        CallToolResult::structured_error(value)
    } else {
        CallToolResult::structured(value)
    })
}

impl ServerHandler for CrmServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "crm-mcp: customer records and scheduling lookups.\n\nTools:\n  - add_customer_record: append a customer issue (status: open|in-progress|resolved|closed; priority: low|medium|high|urgent).\n  - list_event_types: list scheduling event types for an organization.\n\nEvery result carries `status` = success|failure; failures include `kind` and `retryable`.\n"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Null);
        let call = ToolCall::new(request.name.to_string(), arguments);
        into_call_result(self.dispatcher.dispatch(&call).await)
    }
}
