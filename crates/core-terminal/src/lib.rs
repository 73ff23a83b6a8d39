// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Pseudo-terminal session manager. Owns one interactive shell per session,
//! serializes command execution per session, and demarcates output with
//! sentinel markers written by the command itself.

mod error;
mod history;
mod manager;
mod ring;
mod session;

pub use error::TerminalError;
pub use history::{CommandEntry, CommandSource, Executor, HistoryStats};
pub use manager::ShellSessionManager;
pub use session::ShellSession;
