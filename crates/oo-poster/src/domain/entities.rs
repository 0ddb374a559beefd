//! # Domain Entities
//!
//! Core data structures for posting oracle observations.

use super::errors::ConfigError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// 32-byte hash (keccak256, transaction hashes).
pub type Hash = [u8; 32];

/// Ethereum-style address: last 20 bytes of keccak256(pubkey).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

/// Identity recovered from a valid payload signature.
///
/// The contract stores records under this address, so it is only ever
/// obtained from signature recovery, never supplied by a caller.
pub type Attestor = Address;

impl Address {
    /// The zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a `0x`-prefixed (or bare) 40 character hex string.
    pub fn from_hex(s: &str) -> Result<Self, ConfigError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidAddress(s.to_string()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Observations
// =============================================================================

/// Value type carried by a message, selected by its `kind` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `uint64` values (kind `"prices"`)
    Numeric,
    /// `string` values (kind `"strings"`)
    Text,
}

impl ValueKind {
    /// Message tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            ValueKind::Numeric => "prices",
            ValueKind::Text => "strings",
        }
    }

    /// Resolve a message tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "prices" => Some(ValueKind::Numeric),
            "strings" => Some(ValueKind::Text),
            _ => None,
        }
    }
}

/// Observed value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    /// Integer value, e.g. a price scaled to 6 decimals.
    Numeric(u64),
    /// Free-form string value.
    Text(String),
}

impl ObservationValue {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            ObservationValue::Numeric(_) => ValueKind::Numeric,
            ObservationValue::Text(_) => ValueKind::Text,
        }
    }
}

impl fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationValue::Numeric(v) => write!(f, "{}", v),
            ObservationValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single data point for one series, decoded from a payload message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    /// Series identifier, e.g. `"ETH"`.
    pub key: String,
    /// Observed value.
    pub value: ObservationValue,
    /// Source time (seconds since the Unix epoch).
    pub timestamp: u64,
}

impl Observation {
    /// Numeric observation.
    pub fn numeric(key: impl Into<String>, value: u64, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value: ObservationValue::Numeric(value),
            timestamp,
        }
    }

    /// Text observation.
    pub fn text(key: impl Into<String>, value: impl Into<String>, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            value: ObservationValue::Text(value.into()),
            timestamp,
        }
    }
}

/// Signed message as produced by an attestor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// ABI encoded observations.
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
    /// 65-byte `r || s || v` signature over the message digest.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl Payload {
    /// Create a payload.
    pub fn new(message: Vec<u8>, signature: Vec<u8>) -> Self {
        Self { message, signature }
    }
}

/// (attestor, key) pair under which the data contract stores a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Signer of the record.
    pub attestor: Attestor,
    /// Series identifier.
    pub key: String,
}

impl RecordKey {
    /// Create a record key.
    pub fn new(attestor: Attestor, key: impl Into<String>) -> Self {
        Self {
            attestor,
            key: key.into(),
        }
    }
}

/// Last accepted observation of one attestor for one key, as held on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Signer of the record.
    pub attestor: Attestor,
    /// The accepted observation.
    pub observation: Observation,
}

impl StoredRecord {
    /// Create a stored record.
    pub fn new(attestor: Attestor, observation: Observation) -> Self {
        Self {
            attestor,
            observation,
        }
    }

    /// Key under which this record is stored.
    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(self.attestor, self.observation.key.clone())
    }
}

/// Aggregate value for one key computed from the on-chain records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    /// Series identifier.
    pub key: String,
    /// Aggregated (median) value.
    pub value: ObservationValue,
    /// Local time of the computation (seconds since the Unix epoch).
    pub computed_at: u64,
    /// Number of records the value was computed from.
    pub source_record_count: usize,
}

/// A payload whose signer has been recovered and whose message decoded.
///
/// Only constructed by the verification pipeline, so the attestor is always
/// the proven signer of `message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPayload {
    attestor: Attestor,
    observations: Vec<Observation>,
    message: Vec<u8>,
    signature: Vec<u8>,
}

impl VerifiedPayload {
    pub(crate) fn new(attestor: Attestor, observations: Vec<Observation>, payload: Payload) -> Self {
        Self {
            attestor,
            observations,
            message: payload.message,
            signature: payload.signature,
        }
    }

    /// Recovered signer.
    pub fn attestor(&self) -> Attestor {
        self.attestor
    }

    /// Decoded observations.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Raw message bytes, forwarded unchanged to the contract.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Raw signature bytes, forwarded unchanged to the contract.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Record keys this payload would write.
    pub fn record_keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.observations
            .iter()
            .map(move |o| RecordKey::new(self.attestor, o.key.clone()))
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Caller-supplied transaction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxOptions {
    /// Sending account.
    pub from: Address,
    /// Gas limit.
    pub gas: u64,
    /// Gas price in wei.
    #[serde(rename = "gasPrice")]
    pub gas_price: u64,
    /// Extra parameters passed through to the ledger client untouched.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            from: Address::ZERO,
            gas: 1_000_000,
            gas_price: 1_000_000_000,
            extra: BTreeMap::new(),
        }
    }
}

/// Fully built write transaction handed to the ledger client.
#[derive(Clone, Debug, PartialEq)]
pub struct TxRequest {
    /// Target contract.
    pub to: Address,
    /// ABI encoded call data (selector + arguments).
    pub data: Vec<u8>,
    /// Sender, gas and extra parameters.
    pub options: TxOptions,
}

/// Event emitted while executing a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    /// Emitting contract.
    pub address: Address,
    /// Decoded event fields by name.
    #[serde(rename = "returnValues")]
    pub return_values: serde_json::Map<String, serde_json::Value>,
}

/// Receipt of a mined transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash.
    #[serde(rename = "transactionHash", with = "hex_hash")]
    pub transaction_hash: Hash,
    /// `false` when execution reverted.
    pub status: bool,
    /// Emitted events, grouped by event name.
    pub events: HashMap<String, Vec<EventLog>>,
}

/// Result of a confirmed write transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Transaction hash.
    pub transaction_hash: Hash,
    /// Record keys carried by the transaction.
    pub submitted: BTreeSet<RecordKey>,
    /// Record keys the contract confirmed as written.
    pub updated: BTreeSet<RecordKey>,
}

impl TransactionOutcome {
    /// Distinct series keys with at least one confirmed write.
    pub fn updated_keys(&self) -> BTreeSet<String> {
        self.updated.iter().map(|k| k.key.clone()).collect()
    }

    /// Submitted record keys the contract did not write.
    pub fn unconfirmed(&self) -> BTreeSet<RecordKey> {
        self.submitted.difference(&self.updated).cloned().collect()
    }
}

/// Format a hash as `0x`-prefixed hex.
pub fn hash_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

mod hex_hash {
    use super::Hash;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::hash_hex(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes =
            hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 byte hash"))
    }
}
