// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the core and its transport boundary.
//!
//! Errors are classified by kind, not by type name, per the error handling
//! design: each kind has a single recovery policy and a single HTTP status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A closed classification of every failure the core can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Repository I/O failure.
    Storage,
    /// Malformed input, path traversal, missing required field.
    Validation,
    /// Unknown ticket or agent.
    NotFound,
    /// Delete while running, start while started.
    Conflict,
    /// Ticket age exceeded `timeoutMs`, or long-poll expiry.
    Timeout,
    /// Per-agent executor lock held by another delivery.
    ExecutorBusy,
    /// Subprocess nonzero exit or stream error.
    ExecutorFail,
    /// Bootstrap `custom` script matched the deny-list.
    BootstrapUnsafe,
    /// Bootstrap mode threw during execution.
    BootstrapFail,
    /// Missing or incorrect bearer token at the transport boundary.
    Unauthorized,
}

impl ErrorCode {
    /// The HTTP status this kind maps to at the transport boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Storage => 500,
            ErrorCode::Validation => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::Timeout => 408,
            ErrorCode::ExecutorBusy => 409,
            ErrorCode::ExecutorFail => 500,
            ErrorCode::BootstrapUnsafe => 400,
            ErrorCode::BootstrapFail => 500,
            ErrorCode::Unauthorized => 401,
        }
    }

    /// Stable, wire-facing string identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Storage => "storage",
            ErrorCode::Validation => "validation",
            ErrorCode::NotFound => "not-found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ExecutorBusy => "executor-busy",
            ErrorCode::ExecutorFail => "executor-fail",
            ErrorCode::BootstrapUnsafe => "bootstrap-unsafe",
            ErrorCode::BootstrapFail => "bootstrap-fail",
            ErrorCode::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error carrying a kind and a human-readable detail.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<ErrorCode> for CoreError {
    fn from(code: ErrorCode) -> Self {
        let message = code.as_str().to_owned();
        Self { code, message }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
