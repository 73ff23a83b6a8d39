// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One configured tool-provider subprocess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpProviderSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// The manifest named by `MCP_CONFIG_PATH`: a flat list of provider specs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpManifest {
    #[serde(default)]
    pub providers: Vec<McpProviderSpec>,
}

impl McpManifest {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| ConfigError::McpManifestRead {
                path: path.to_path_buf(),
                source,
            })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::McpManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_multi_provider_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.yaml");
        std::fs::write(
            &path,
            r#"
providers:
  - name: filesystem
    command: npx
    args: ["-y", "@modelcontextprotocol/server-filesystem", "/workspace"]
  - name: search
    command: /usr/local/bin/search-mcp
    env:
      SEARCH_API_KEY: "secret"
"#,
        )
        .unwrap();

        let manifest = McpManifest::load(&path).unwrap();
        assert_eq!(manifest.providers.len(), 2);
        assert_eq!(manifest.providers[0].name, "filesystem");
        assert_eq!(manifest.providers[0].args.len(), 3);
        assert_eq!(
            manifest.providers[1].env.get("SEARCH_API_KEY").map(String::as_str),
            Some("secret")
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = McpManifest::load(Path::new("/nonexistent/mcp.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::McpManifestRead { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.yaml");
        std::fs::write(&path, "providers: [not, a, mapping").unwrap();
        let err = McpManifest::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::McpManifestParse { .. }));
    }
}
