// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-poll waiters: one-shot completion primitives keyed by ticket id.
//!
//! A waiter is registered by a `wait for reply` request and fulfilled exactly
//! once, either by the ticket reaching a terminal state or by its own
//! deadline expiring. Fulfillment must happen inside the same critical
//! section as the terminal state transition so a response can never be
//! dropped between the transition and the waiter's registration.
//!
//! Spec §3 models this as a mapping from ticket id to a *set* of callbacks —
//! more than one caller may be long-polling the same ticket at once (two UI
//! tabs, or a caller that timed out and immediately re-polled) — so each
//! ticket id owns a `Vec` of waiters rather than a single slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::ticket::Ticket;

/// Sent to a waiting caller exactly once.
pub type WaiterOutcome = Ticket;

struct Waiter {
    id: u64,
    sender: oneshot::Sender<WaiterOutcome>,
}

/// Identifies one registered waiter so it can be cancelled without
/// disturbing any other waiter registered for the same ticket.
pub struct WaiterHandle {
    ticket_id: Uuid,
    id: u64,
}

/// Registry of in-flight long-poll waiters, a set per ticket.
#[derive(Default)]
pub struct WaiterRegistry {
    waiters: Mutex<HashMap<Uuid, Vec<Waiter>>>,
    next_id: AtomicU64,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self { waiters: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
    }

    /// Register interest in `ticket_id`'s terminal state. Returns a handle
    /// (for `cancel`) and a receiver that resolves exactly once: either via
    /// `fulfill` or by the caller's own timeout, in which case `cancel` must
    /// be called with the returned handle to avoid a leaked slot.
    pub async fn register(&self, ticket_id: Uuid) -> (WaiterHandle, oneshot::Receiver<WaiterOutcome>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters.lock().await.entry(ticket_id).or_default().push(Waiter { id, sender: tx });
        (WaiterHandle { ticket_id, id }, rx)
    }

    /// Deliver the final ticket state to every waiter registered for this
    /// ticket, if any, and drain the set. A ticket with no waiters (no one
    /// is currently polling, or they all already timed out and deregistered)
    /// is not an error.
    pub async fn fulfill(&self, ticket: &Ticket) {
        if let Some(registered) = self.waiters.lock().await.remove(&ticket.ticket_id) {
            for waiter in registered {
                let _ = waiter.sender.send(ticket.clone());
            }
        }
    }

    /// Remove one waiter without fulfilling it, used when that waiter's own
    /// deadline elapses first. Other waiters registered for the same ticket
    /// are left untouched.
    pub async fn cancel(&self, handle: &WaiterHandle) {
        let mut guard = self.waiters.lock().await;
        if let Some(registered) = guard.get_mut(&handle.ticket_id) {
            registered.retain(|w| w.id != handle.id);
            if registered.is_empty() {
                guard.remove(&handle.ticket_id);
            }
        }
    }

    /// Number of waiters currently registered across all tickets, for
    /// diagnostics.
    pub async fn len(&self) -> usize {
        self.waiters.lock().await.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
#[path = "waiter_tests.rs"]
mod tests;
