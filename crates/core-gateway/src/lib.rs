// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Chat and structured socket endpoints sitting in front of the model,
//! terminal, browser, tool-provider, and memory components: axum
//! WebSocket hubs bridging the wire protocol to those components.

mod chat;
mod error;
mod hub;
mod readiness;
mod router;
mod state;
mod structured;
mod task_table;

pub use chat::{ChatGateway, chat_ws_handler};
pub use error::GatewayError;
pub use hub::{spawn_hub, HubHandle};
pub use readiness::{healthz, Readiness, ReadinessSnapshot};
pub use router::{build_router, serve};
pub use state::AppState;
pub use structured::{structured_ws_handler, StructuredGateway};
pub use task_table::{Task, TaskState, TaskTable};
