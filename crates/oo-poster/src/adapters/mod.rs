//! # Adapters Module
//!
//! Infrastructure adapters implementing the outbound ports.

pub mod clock;
pub mod in_memory_ledger;

pub use clock::{FixedTimeSource, SystemTimeSource};
pub use in_memory_ledger::{InMemoryOracleLedger, LedgerFaults};
