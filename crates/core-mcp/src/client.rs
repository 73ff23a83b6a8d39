// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use core_config::McpManifest;

use crate::error::McpError;
use crate::provider::{ProviderState, ToolProvider};

/// Owns every tool-provider subprocess named in the configured manifest.
///
/// Providers are spawned independently; one failing to initialize does not
/// prevent the others from becoming ready (logged and omitted from the
/// registry rather than failing the whole client).
pub struct McpClient {
    providers: HashMap<String, Arc<ToolProvider>>,
}

impl McpClient {
    /// Spawn every provider in `manifest`, skipping (and logging) any that
    /// fail to initialize.
    pub async fn spawn_all(manifest: &McpManifest) -> Self {
        let mut providers = HashMap::new();
        for spec in &manifest.providers {
            match ToolProvider::spawn(spec).await {
                Ok(provider) => {
                    providers.insert(spec.name.clone(), Arc::new(provider));
                }
                Err(e) => {
                    warn!(provider = %spec.name, error = %e, "tool provider failed to initialize, omitting from registry");
                }
            }
        }
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn provider_state(&self, name: &str) -> Option<ProviderState> {
        self.providers.get(name).map(|p| p.state())
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ToolProvider>, McpError> {
        self.providers
            .get(name)
            .ok_or_else(|| McpError::UnknownProvider(name.to_string()))
    }

    pub async fn list_tools(&self, provider: &str) -> Result<Value, McpError> {
        self.get(provider)?.list_tools().await
    }

    pub async fn call_tool(&self, provider: &str, tool: &str, args: Value) -> Result<Value, McpError> {
        self.get(provider)?.call_tool(tool, args).await
    }

    pub async fn close_all(&self) {
        for provider in self.providers.values() {
            provider.close().await;
        }
    }
}
