//! # Outbound Ports (Driven Ports / SPI)
//!
//! Dependencies the poster needs from the outside world: a ledger to send
//! write transactions to, read access to stored records, and a clock.

use crate::domain::entities::{Attestor, Hash, StoredRecord, TxReceipt, TxRequest};
use crate::domain::errors::LedgerError;
use async_trait::async_trait;

/// Sends write transactions and reports their receipts.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and broadcast a transaction, returning its hash.
    ///
    /// # Errors
    /// * `LedgerError::Transport` - nothing was broadcast
    /// * `LedgerError::Reverted` - the node refused the transaction outright
    async fn send_transaction(&self, request: TxRequest) -> Result<Hash, LedgerError>;

    /// Wait until the transaction is mined and return its receipt.
    ///
    /// May wait indefinitely; callers bound it with their own timeout.
    async fn wait_for_receipt(&self, tx_hash: Hash) -> Result<TxReceipt, LedgerError>;
}

/// Read access to the records held by the data contract.
#[async_trait]
pub trait OracleDataReader: Send + Sync {
    /// Current record for (attestor, key), if any.
    async fn read_record(
        &self,
        attestor: Attestor,
        key: &str,
    ) -> Result<Option<StoredRecord>, LedgerError>;
}

/// Local wall clock in seconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    /// Current time.
    fn now_secs(&self) -> u64;
}
