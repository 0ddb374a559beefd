//! In-memory Open Oracle ledger.
//!
//! Implements `LedgerClient` and `OracleDataReader` against a simulated
//! data contract. Each write call is executed the way the on-chain data
//! contract does it: every (message, signature) pair is authenticated, and
//! each observation is stored only if it is strictly newer than the stored
//! record for (signer, key). Stored observations emit `Write`; skipped ones
//! emit `NotWritten`.

use crate::domain::binding::ContractBinding;
use crate::domain::codec;
use crate::domain::entities::{
    hash_hex, Address, Attestor, EventLog, Hash, RecordKey, StoredRecord, TxReceipt, TxRequest,
};
use crate::domain::errors::LedgerError;
use crate::domain::signature::{keccak256, SignatureVerifier};
use crate::ports::outbound::{LedgerClient, OracleDataReader};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// Faults injected into the next transactions.
#[derive(Debug, Clone, Default)]
pub struct LedgerFaults {
    /// Refuse every transaction at broadcast with this revert reason
    pub revert_with: Option<String>,
    /// Transactions with a lower gas limit are mined with status 0
    pub min_gas: Option<u64>,
    /// Execute transactions but never deliver their receipts
    pub drop_confirmations: bool,
    /// Fail `send_transaction` before broadcasting
    pub transport_down: bool,
    /// Fail `read_record`
    pub reads_down: bool,
    /// Fail `read_record` for these attestors only
    pub unreadable: Vec<Attestor>,
    /// Records another poster lands just before the next transaction
    pub front_run: Vec<StoredRecord>,
}

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<RecordKey, StoredRecord>,
    receipts: HashMap<Hash, TxReceipt>,
    pending: Vec<Hash>,
    sent: Vec<TxRequest>,
    nonce: u64,
}

/// Simulated view/data contract pair.
pub struct InMemoryOracleLedger {
    binding: ContractBinding,
    verifier: SignatureVerifier,
    state: RwLock<LedgerState>,
    faults: RwLock<LedgerFaults>,
}

impl InMemoryOracleLedger {
    /// Ledger accepting calls to the method bound by `binding`.
    pub fn new(binding: ContractBinding) -> Self {
        Self {
            binding,
            verifier: SignatureVerifier::new(),
            state: RwLock::new(LedgerState::default()),
            faults: RwLock::new(LedgerFaults::default()),
        }
    }

    /// Replace the active faults.
    pub fn set_faults(&self, faults: LedgerFaults) {
        *self.faults.write() = faults;
    }

    /// Store a record directly, as if written by an earlier transaction.
    pub fn insert_record(&self, record: StoredRecord) {
        self.state.write().records.insert(record.record_key(), record);
    }

    /// Stored record for (attestor, key).
    pub fn record(&self, attestor: Attestor, key: &str) -> Option<StoredRecord> {
        self.state
            .read()
            .records
            .get(&RecordKey::new(attestor, key))
            .cloned()
    }

    /// Every transaction request received, in order.
    pub fn sent_transactions(&self) -> Vec<TxRequest> {
        self.state.read().sent.clone()
    }

    /// Execute a write call and build its receipt.
    fn execute(&self, state: &mut LedgerState, tx_hash: Hash, request: &TxRequest) -> TxReceipt {
        let reverted = TxReceipt {
            transaction_hash: tx_hash,
            status: false,
            events: HashMap::new(),
        };

        if request.to != self.binding.contract() {
            return reverted;
        }

        let call = match self.binding.decode_call(&request.data) {
            Ok(call) => call,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed call");
                return reverted;
            }
        };

        // Authenticate everything before touching storage; one bad pair
        // reverts the whole call.
        let mut authenticated = Vec::with_capacity(call.messages.len());
        for (message, signature) in call.messages.iter().zip(&call.signatures) {
            let source = match self.verifier.verify(message, signature) {
                Ok(source) => source,
                Err(_) => return reverted,
            };
            match codec::decode(message) {
                Ok(observations) => authenticated.push((source, observations)),
                Err(_) => return reverted,
            }
        }

        let mut writes = Vec::new();
        let mut skipped = Vec::new();
        for (source, observations) in authenticated {
            for obs in observations {
                let record_key = RecordKey::new(source, obs.key.clone());
                let prior = state
                    .records
                    .get(&record_key)
                    .map(|r| r.observation.timestamp);

                if prior.map_or(true, |ts| obs.timestamp > ts) {
                    writes.push(event(
                        self.binding.contract(),
                        json!({
                            "source": source.to_string(),
                            "key": obs.key,
                            "timestamp": obs.timestamp,
                            "value": obs.value,
                        }),
                    ));
                    state
                        .records
                        .insert(record_key, StoredRecord::new(source, obs));
                } else {
                    skipped.push(event(
                        self.binding.contract(),
                        json!({
                            "priorTimestamp": prior.unwrap_or_default(),
                            "messageTimestamp": obs.timestamp,
                        }),
                    ));
                }
            }
        }

        let mut events = HashMap::new();
        if !writes.is_empty() {
            events.insert("Write".to_string(), writes);
        }
        if !skipped.is_empty() {
            events.insert("NotWritten".to_string(), skipped);
        }

        TxReceipt {
            transaction_hash: tx_hash,
            status: true,
            events,
        }
    }
}

fn event(address: Address, fields: Value) -> EventLog {
    let return_values = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    EventLog {
        address,
        return_values,
    }
}

#[async_trait]
impl LedgerClient for InMemoryOracleLedger {
    async fn send_transaction(&self, request: TxRequest) -> Result<Hash, LedgerError> {
        let active = self.faults.read().clone();

        if active.transport_down {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        if let Some(reason) = active.revert_with {
            return Err(LedgerError::Reverted(reason));
        }

        let front_run = std::mem::take(&mut self.faults.write().front_run);
        let mut state = self.state.write();
        for record in front_run {
            state.records.insert(record.record_key(), record);
        }

        state.nonce += 1;
        let mut preimage = request.data.clone();
        preimage.extend_from_slice(&state.nonce.to_be_bytes());
        let tx_hash = keccak256(&preimage);
        state.sent.push(request.clone());

        let receipt = match active.min_gas {
            Some(required) if request.options.gas < required => TxReceipt {
                transaction_hash: tx_hash,
                status: false,
                events: HashMap::new(),
            },
            _ => self.execute(&mut state, tx_hash, &request),
        };

        info!(
            tx_hash = %hash_hex(&tx_hash),
            status = receipt.status,
            "Executed write transaction"
        );

        if active.drop_confirmations {
            state.pending.push(tx_hash);
        } else {
            state.receipts.insert(tx_hash, receipt);
        }
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: Hash) -> Result<TxReceipt, LedgerError> {
        let found = {
            let state = self.state.read();
            if let Some(receipt) = state.receipts.get(&tx_hash) {
                Some(receipt.clone())
            } else if state.pending.contains(&tx_hash) {
                None
            } else {
                return Err(LedgerError::UnknownTransaction(tx_hash));
            }
        };

        match found {
            Some(receipt) => Ok(receipt),
            None => futures::future::pending().await,
        }
    }
}

#[async_trait]
impl OracleDataReader for InMemoryOracleLedger {
    async fn read_record(
        &self,
        attestor: Attestor,
        key: &str,
    ) -> Result<Option<StoredRecord>, LedgerError> {
        let faults = self.faults.read();
        if faults.reads_down || faults.unreadable.contains(&attestor) {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        drop(faults);
        Ok(self.record(attestor, key))
    }
}
