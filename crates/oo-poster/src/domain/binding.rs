//! # Contract Binding
//!
//! The write method is resolved against the view contract ABI once, when
//! the poster is configured. Submissions only ever go through the bound
//! [`ethabi::Function`], so a typo in the method name fails at startup
//! instead of on the first batch.
//!
//! Accepted inputs:
//!
//! ```text
//! (bytes[] messages, bytes[] signatures)
//! (bytes[] messages, bytes[] signatures, string[] keys)
//! ```
//!
//! The optional `keys` argument lists the series whose view aggregate the
//! contract should refresh.

use super::entities::{Address, VerifiedPayload};
use super::errors::{ConfigError, LedgerError, SubmissionError};
use ethabi::{Contract, Function, ParamType, StateMutability, Token};
use std::collections::BTreeSet;

/// ABI of the Open Oracle view write method and its read-side companion.
pub const OPEN_ORACLE_VIEW_ABI: &str = r#"[
  {
    "type": "function",
    "name": "postPrices",
    "inputs": [
      {"name": "messages", "type": "bytes[]"},
      {"name": "signatures", "type": "bytes[]"},
      {"name": "symbols", "type": "string[]"}
    ],
    "outputs": [],
    "stateMutability": "nonpayable"
  },
  {
    "type": "function",
    "name": "price",
    "inputs": [{"name": "symbol", "type": "string"}],
    "outputs": [{"name": "", "type": "uint256"}],
    "stateMutability": "view"
  }
]"#;

/// Input layout of the bound method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `(bytes[] messages, bytes[] signatures)`
    Pairs,
    /// `(bytes[] messages, bytes[] signatures, string[] keys)`
    PairsWithKeys,
}

/// Arguments recovered from call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    /// Raw messages, in call order.
    pub messages: Vec<Vec<u8>>,
    /// Raw signatures, parallel to `messages`.
    pub signatures: Vec<Vec<u8>>,
    /// Keys to refresh; empty for [`CallShape::Pairs`].
    pub keys: Vec<String>,
}

/// Write method resolved against a contract ABI.
#[derive(Debug, Clone)]
pub struct ContractBinding {
    contract: Address,
    function: Function,
    shape: CallShape,
}

impl ContractBinding {
    /// Parse `abi_json` and bind `method` on `contract`.
    pub fn bind(abi_json: &str, method: &str, contract: Address) -> Result<Self, ConfigError> {
        let abi = Contract::load(abi_json.as_bytes()).map_err(|e| ConfigError::Abi(e.to_string()))?;
        let function = abi
            .function(method)
            .map_err(|_| ConfigError::MethodNotFound(method.to_string()))?;
        Self::from_function(function.clone(), contract)
    }

    /// Bind an already parsed function.
    pub fn from_function(function: Function, contract: Address) -> Result<Self, ConfigError> {
        #[allow(deprecated)]
        let read_only = matches!(
            function.state_mutability,
            StateMutability::View | StateMutability::Pure
        ) || function.constant == Some(true);
        if read_only {
            return Err(ConfigError::ReadOnlyMethod(function.name.clone()));
        }

        let bytes_array = ParamType::Array(Box::new(ParamType::Bytes));
        let string_array = ParamType::Array(Box::new(ParamType::String));
        let kinds: Vec<&ParamType> = function.inputs.iter().map(|p| &p.kind).collect();

        let shape = match kinds.as_slice() {
            [m, s] if **m == bytes_array && **s == bytes_array => CallShape::Pairs,
            [m, s, k] if **m == bytes_array && **s == bytes_array && **k == string_array => {
                CallShape::PairsWithKeys
            }
            _ => {
                return Err(ConfigError::MethodShape {
                    method: function.name.clone(),
                    signature: function.signature(),
                })
            }
        };

        Ok(Self {
            contract,
            function,
            shape,
        })
    }

    /// Bound method name.
    pub fn method_name(&self) -> &str {
        &self.function.name
    }

    /// Target contract.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Input layout.
    pub fn shape(&self) -> CallShape {
        self.shape
    }

    /// 4-byte function selector.
    pub fn selector(&self) -> [u8; 4] {
        self.function.short_signature()
    }

    /// Build call data carrying every payload's message and signature.
    pub fn encode_call(&self, payloads: &[VerifiedPayload]) -> Result<Vec<u8>, SubmissionError> {
        if payloads.is_empty() {
            return Err(SubmissionError::EmptyBatch);
        }

        let messages = payloads
            .iter()
            .map(|p| Token::Bytes(p.message().to_vec()))
            .collect();
        let signatures = payloads
            .iter()
            .map(|p| Token::Bytes(p.signature().to_vec()))
            .collect();
        let mut args = vec![Token::Array(messages), Token::Array(signatures)];

        if self.shape == CallShape::PairsWithKeys {
            let keys: BTreeSet<&str> = payloads
                .iter()
                .flat_map(|p| p.observations().iter().map(|o| o.key.as_str()))
                .collect();
            args.push(Token::Array(
                keys.into_iter().map(|k| Token::String(k.to_string())).collect(),
            ));
        }

        self.function
            .encode_input(&args)
            .map_err(|e| SubmissionError::Encoding(e.to_string()))
    }

    /// Parse call data produced by [`ContractBinding::encode_call`].
    pub fn decode_call(&self, data: &[u8]) -> Result<DecodedCall, LedgerError> {
        if data.len() < 4 || data[..4] != self.selector() {
            return Err(LedgerError::Reverted("unknown function selector".into()));
        }

        let mut tokens = self
            .function
            .decode_input(&data[4..])
            .map_err(|e| LedgerError::Reverted(format!("malformed call data: {}", e)))?
            .into_iter();

        let messages = bytes_list(tokens.next())?;
        let signatures = bytes_list(tokens.next())?;
        let keys = match tokens.next() {
            Some(Token::Array(items)) => items
                .into_iter()
                .filter_map(|t| match t {
                    Token::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        if messages.len() != signatures.len() {
            return Err(LedgerError::Reverted(
                "messages and signatures must be 1:1".into(),
            ));
        }

        Ok(DecodedCall {
            messages,
            signatures,
            keys,
        })
    }
}

fn bytes_list(token: Option<Token>) -> Result<Vec<Vec<u8>>, LedgerError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|t| match t {
                Token::Bytes(b) => Ok(b),
                _ => Err(LedgerError::Reverted("expected bytes".into())),
            })
            .collect(),
        _ => Err(LedgerError::Reverted("expected bytes[]".into())),
    }
}
