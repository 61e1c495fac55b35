//! MCP servers declared in the user's global assistant config files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::McpServer;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    #[serde(default)]
    mcp_servers: serde_json::Map<String, serde_json::Value>,
}

/// `~/.mcp.json` then `~/.claude.json`.
pub fn global_config_files(home: &Path) -> Vec<PathBuf> {
    vec![home.join(".mcp.json"), home.join(".claude.json")]
}

fn server_names(path: &Path) -> Vec<String> {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str::<ConfigFile>(&s) {
        Ok(cfg) => cfg.mcp_servers.keys().cloned().collect(),
        Err(e) => {
            tracing::debug!("ignoring {}: {e}", path.display());
            Vec::new()
        }
    }
}

/// Server names across `files`, first occurrence wins.
pub fn discover(files: &[PathBuf]) -> Vec<McpServer> {
    let mut seen = HashSet::new();
    files
        .iter()
        .flat_map(|f| server_names(f))
        .filter(|name| seen.insert(name.clone()))
        .map(|name| McpServer {
            name,
            source: "global".into(),
        })
        .collect()
}
