// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state handed to every Axum handler.

use std::sync::Arc;

use crate::core::Core;

/// Thin wrapper around the process-wide `Core`. Kept as its own type (rather
/// than handing `Arc<Core>` to `Router::with_state` directly) so transport
/// concerns — auth, CORS — can be extended without reshaping `Core` itself.
pub struct AppState {
    pub core: Arc<Core>,
}

impl AppState {
    pub fn new(core: Arc<Core>) -> Arc<Self> {
        Arc::new(Self { core })
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.core.config.auth_token.as_deref()
    }
}
