// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(#[source] anyhow::Error),

    #[error("cdp operation failed: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("operation timed out")]
    Timeout,

    #[error("element index {0} is out of range or stale")]
    StaleIndex(usize),

    #[error("no element matched selector {0:?}")]
    SelectorNotFound(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("overlay rendering failed: {0}")]
    Overlay(#[source] image::ImageError),
}
