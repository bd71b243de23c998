use crm_mcp::{config::GatewayConfig, diagnostics, dispatch::Dispatcher, server::CrmServer};
use rmcp::ServiceExt;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
mod cli;
mod mcp_stdio;

fn print_version() {
    println!("{}", env!("CARGO_PKG_VERSION"));
}

// stdout carries MCP frames, so logs must stay on stderr.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(cli::LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_config() -> GatewayConfig {
    match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("crm-mcp: {} [{}]", e, e.code());
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("version") | Some("--version") | Some("-V") => {
            print_version();
            return Ok(());
        }
        Some("help") | Some("--help") | Some("-h") => {
            cli::print_help();
            return Ok(());
        }
        Some("diagnostics") => {
            let config = load_config();
            print!("{}", diagnostics::describe(&config));
            return Ok(());
        }
        Some("call") => {
            let call = match cli::parse_call_cli(&args[2..]) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("crm-mcp: {e}");
                    std::process::exit(2);
                }
            };
            init_tracing();
            let config = load_config();
            let dispatcher = Dispatcher::from_config(&config)?;
            let out = dispatcher.dispatch(&call).await;
            println!("{}", serde_json::to_string_pretty(&out)?);
            if !out.is_success() {
                std::process::exit(1);
            }
            return Ok(());
        }
        Some(other) if cli::is_serve_flag(other) => {}
        Some(other) => {
            eprintln!(
                "crm-mcp: unknown command `{other}`; use diagnostics|call|help|version, or no args to start MCP server"
            );
            std::process::exit(2);
        }
        None => {}
    }

    init_tracing();
    let config = load_config();
    eprint!("{}", diagnostics::describe(&config));
    let dispatcher = Arc::new(Dispatcher::from_config(&config)?);
    tracing::info!(tools = dispatcher.registry().len(), "starting mcp server on stdio");

    let service = CrmServer::new(dispatcher)
        .serve(mcp_stdio::HybridStdioTransport::new())
        .await?;
    service.waiting().await?;
    Ok(())
}
