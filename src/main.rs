//! MCP Server for Cloud.ru Container Apps and Artifact Registry.
//!
//! This server implements the Model Context Protocol (MCP) over stdio,
//! exposing Cloud.ru Container Apps, Artifact Registry, and docker
//! build/push operations as callable tools.

mod cloud_api;
mod config;
mod description;
mod docker;
mod mcp_protocol;
mod params;

use config::Config;
use mcp_protocol::McpServer;

#[tokio::main]
async fn main() {
    let cfg = Config::load();

    // Log configuration for debugging (to stderr so it doesn't interfere with MCP protocol)
    eprintln!(
        "[cloudru-containerapps-mcp] Starting with config: registry_name={:?}, repository_name={:?}, project_id={:?}, current_dir={:?}",
        cfg.registry_name, cfg.repository_name, cfg.project_id, cfg.current_dir
    );

    let server = McpServer::new(cfg);

    if let Err(e) = server.run().await {
        eprintln!("[cloudru-containerapps-mcp] Error: {}", e);
        std::process::exit(1);
    }
}
