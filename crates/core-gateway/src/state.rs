// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use core_browser::BrowserManager;
use core_mcp::McpClient;
use core_memory::TaskMemoryRegistry;
use core_model::ModelProvider;
use core_terminal::{Executor, ShellSessionManager};

use crate::readiness::Readiness;
use crate::task_table::TaskTable;

/// Every component the two endpoint hubs dispatch into. Cheap to clone —
/// each field is already an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn ModelProvider>,
    pub mcp: Arc<McpClient>,
    pub terminal: Arc<Executor>,
    pub browser: Arc<BrowserManager>,
    pub memory: Arc<TaskMemoryRegistry>,
    pub tasks: Arc<TaskTable>,
    pub readiness: Arc<Readiness>,
    pub command_timeout: Duration,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: Arc<dyn ModelProvider>,
        mcp: Arc<McpClient>,
        shell: String,
        max_sessions: usize,
        browser_headless: bool,
        command_timeout: Duration,
    ) -> Self {
        let readiness = Readiness::new();
        readiness.mark_model_ready();
        readiness.mark_mcp_ready();

        let terminal = Arc::new(Executor::new(ShellSessionManager::new(shell, max_sessions)));
        readiness.mark_terminal_ready();

        let browser = Arc::new(BrowserManager::new(browser_headless));
        readiness.mark_browser_ready();

        let memory = Arc::new(TaskMemoryRegistry::new());
        readiness.mark_memory_ready();

        let tasks = TaskTable::new();

        Self {
            model,
            mcp,
            terminal,
            browser,
            memory,
            tasks,
            readiness,
            command_timeout,
        }
    }
}
