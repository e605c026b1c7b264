// SPDX-License-Identifier: MIT

//! Adapter traits for the external collaborators.
//!
//! The network layer that scrapes the crafting page, submits crafts and
//! delivers chat messages lives outside this crate; the scheduler only sees
//! these contracts. Test doubles implement them with scripted responses.

use async_trait::async_trait;
use packsmith_core::{EligibilitySnapshot, GemPreference, GemTotals, ItemId};
use thiserror::Error;

/// Errors surfaced by the crafting service adapters.
///
/// Everything here is transient infrastructure as far as the scheduler is
/// concerned: it retries with backoff and never shows the raw error to the
/// user.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("account not connected")]
    NotConnected,
    #[error("request failed: {0}")]
    Request(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Result of one craft submission.
///
/// `success` is the service's claim, not the truth — a reported failure may
/// still have gone through, which is what the failure-verification protocol
/// untangles. Fresh gem balances ride along when the service echoes them.
#[derive(Debug, Clone, Default)]
pub struct CraftOutcome {
    pub success: bool,
    pub gems: Option<GemTotals>,
}

/// The crafting/eligibility source for one or more accounts.
#[async_trait]
pub trait CraftBackend: Send + Sync + 'static {
    /// Whether the account's session is currently usable. A disconnected
    /// account makes the queue retry in a tight loop rather than backoff,
    /// since reconnection is handled elsewhere and tends to be quick.
    fn is_connected(&self, account: &str) -> bool;

    /// Fetch the full eligibility table and gem balances for an account.
    async fn fetch_eligibility(&self, account: &str) -> Result<EligibilitySnapshot, BackendError>;

    /// Submit one craft.
    async fn craft(
        &self,
        account: &str,
        item: ItemId,
        series: u32,
        preference: GemPreference,
    ) -> Result<CraftOutcome, BackendError>;
}

/// Outbound notification channel, one logical destination per source key.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Whether the destination behind this source key can currently be
    /// reached (e.g. the owning account is online).
    fn can_reach(&self, source: &str) -> bool;

    /// Deliver one batched message to the destination.
    async fn send(&self, source: &str, text: &str) -> Result<(), BackendError>;
}
