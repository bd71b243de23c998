use crm_mcp::api::ToolCall;

pub(crate) const LOG_FILTER_ENV: &str = "CRM_MCP_LOG";

pub(crate) fn print_help() {
    println!(
        "Usage:\n  crm-mcp [serve|--stdio]\n  crm-mcp diagnostics\n  crm-mcp call <tool> [<json-arguments>]\n  crm-mcp help\n  crm-mcp version\n\nNotes:\n  - No args => start MCP server over stdio (NDJSON or Content-Length framing).\n  - Logs go to stderr; filter via {LOG_FILTER_ENV} (default: info).\n  - Backends are configured via env, optionally layered over a TOML file:\n      CRM_MCP_CONFIG=<path.toml>\n      GOOGLE_SHEETS_SPREADSHEET_ID, GOOGLE_SHEETS_ACCESS_TOKEN, GOOGLE_SHEETS_RANGE\n      GOOGLE_APPLICATION_CREDENTIALS=<service-account.json>\n      CALENDLY_API_TOKEN, CALENDLY_ORGANIZATION_URI\n      CRM_MCP_BACKEND_TIMEOUT_MS, CRM_MCP_MAX_EVENT_TYPE_PAGES\n\nExamples:\n  crm-mcp diagnostics\n  crm-mcp call list_event_types '{{\"active\":true}}'\n  crm-mcp call add_customer_record '{{\"name\":\"Jane Doe\",\"email\":\"jane@example.com\",\"issue\":\"billing\",\"status\":\"open\",\"priority\":\"high\"}}'\n"
    );
}

pub(crate) fn is_serve_flag(arg: &str) -> bool {
    matches!(arg, "serve" | "--stdio" | "stdio" | "--mcp" | "mcp")
}

pub(crate) fn parse_call_cli(args: &[String]) -> Result<ToolCall, String> {
    let Some(name) = args.first().filter(|s| !s.trim().is_empty()) else {
        return Err("call requires a tool name: crm-mcp call <tool> [<json-arguments>]".to_string());
    };
    let arguments = match args.get(1) {
        Some(raw) => serde_json::from_str::<serde_json::Value>(raw)
            .map_err(|e| format!("call arguments must be JSON: {e}"))?,
        None => serde_json::Value::Object(Default::default()),
    };
    if let Some(extra) = args.get(2) {
        return Err(format!("unexpected argument `{extra}` after call arguments"));
    }
    Ok(ToolCall::new(name.trim(), arguments))
}
