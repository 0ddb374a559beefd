//! # Payload Codec
//!
//! Message layout, Ethereum ABI encoded:
//!
//! ```text
//! abi.encode(string kind, uint64 timestamp, string[] keys, T[] values)
//! ```
//!
//! `kind == "prices"` carries `uint64` values, `kind == "strings"` carries
//! `string` values. Every observation in a message shares its timestamp.

use super::entities::{Observation, ObservationValue, ValueKind};
use super::errors::CodecError;
use ethabi::{ParamType, Token, Uint};

/// Stateless encoder/decoder for observation messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCodec;

impl PayloadCodec {
    /// Create a codec.
    pub fn new() -> Self {
        Self
    }

    /// Decode a message into its observations.
    pub fn decode(&self, message: &[u8]) -> Result<Vec<Observation>, CodecError> {
        decode(message)
    }

    /// Encode observations into a message.
    pub fn encode(&self, observations: &[Observation]) -> Result<Vec<u8>, CodecError> {
        encode(observations)
    }
}

fn layout(kind: ValueKind) -> [ParamType; 4] {
    let value_type = match kind {
        ValueKind::Numeric => ParamType::Uint(64),
        ValueKind::Text => ParamType::String,
    };
    [
        ParamType::String,
        ParamType::Uint(64),
        ParamType::Array(Box::new(ParamType::String)),
        ParamType::Array(Box::new(value_type)),
    ]
}

fn to_u64(value: &Uint) -> Result<u64, CodecError> {
    if value.bits() > 64 {
        return Err(CodecError::ValueOverflow);
    }
    Ok(value.low_u64())
}

fn abi_error(e: ethabi::Error) -> CodecError {
    CodecError::Abi(e.to_string())
}

/// Decode a message into its observations.
pub fn decode(message: &[u8]) -> Result<Vec<Observation>, CodecError> {
    // The kind tag selects the value type, so read it first.
    let head = ethabi::decode(&[ParamType::String], message).map_err(abi_error)?;
    let tag = match head.into_iter().next() {
        Some(Token::String(tag)) => tag,
        _ => return Err(CodecError::Abi("missing kind tag".into())),
    };
    let kind = ValueKind::from_tag(&tag).ok_or(CodecError::UnknownKind(tag))?;

    let mut tokens = ethabi::decode(&layout(kind), message)
        .map_err(abi_error)?
        .into_iter();

    let (timestamp, keys, values) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    {
        (Some(_), Some(Token::Uint(ts)), Some(Token::Array(keys)), Some(Token::Array(values))) => {
            (to_u64(&ts)?, keys, values)
        }
        _ => return Err(CodecError::Abi("unexpected token layout".into())),
    };

    if keys.len() != values.len() {
        return Err(CodecError::LengthMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    if keys.is_empty() {
        return Err(CodecError::Empty);
    }

    keys.into_iter()
        .zip(values)
        .map(|(key, value)| {
            let key = match key {
                Token::String(k) if !k.is_empty() => k,
                Token::String(_) => return Err(CodecError::EmptyKey),
                _ => return Err(CodecError::Abi("key is not a string".into())),
            };
            let value = match (kind, value) {
                (ValueKind::Numeric, Token::Uint(v)) => ObservationValue::Numeric(to_u64(&v)?),
                (ValueKind::Text, Token::String(s)) => ObservationValue::Text(s),
                _ => return Err(CodecError::Abi("value does not match kind".into())),
            };
            Ok(Observation {
                key,
                value,
                timestamp,
            })
        })
        .collect()
}

/// Encode observations into a single message.
///
/// All observations must share a timestamp and a value kind.
pub fn encode(observations: &[Observation]) -> Result<Vec<u8>, CodecError> {
    let first = observations.first().ok_or(CodecError::Empty)?;
    let kind = first.value.kind();
    let timestamp = first.timestamp;

    let mut keys = Vec::with_capacity(observations.len());
    let mut values = Vec::with_capacity(observations.len());
    for obs in observations {
        if obs.timestamp != timestamp {
            return Err(CodecError::MixedTimestamps);
        }
        if obs.key.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        keys.push(Token::String(obs.key.clone()));
        values.push(match &obs.value {
            ObservationValue::Numeric(v) if kind == ValueKind::Numeric => Token::Uint((*v).into()),
            ObservationValue::Text(s) if kind == ValueKind::Text => Token::String(s.clone()),
            _ => return Err(CodecError::MixedValueKinds),
        });
    }

    Ok(ethabi::encode(&[
        Token::String(kind.tag().to_string()),
        Token::Uint(timestamp.into()),
        Token::Array(keys),
        Token::Array(values),
    ]))
}
