// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Wire types and codecs for the two socket endpoints: the free-form chat
//! envelope and the structured request/response/notification protocol.

mod chat;
mod error;
mod structured;

pub use chat::{Message, MessageType};
pub use error::StructuredError;
pub use structured::{Handler, RequestId, StructuredCall, StructuredCodec, StructuredResponse};
