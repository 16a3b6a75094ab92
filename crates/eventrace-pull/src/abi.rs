//! Event ABI handling: canonical signature, topic0 and log decoding.
//!
//! A decoded log becomes a JSON payload:
//! ```text
//! { "event", "signature", "address", "blockNumber",
//!   "transactionHash", "logIndex", "fields": { name: value, .. } }
//! ```
//! Addresses are EIP-55 checksummed, integers are decimal strings (they
//! routinely exceed `u64`), byte values are `0x` hex.

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_json_abi::{Event, JsonAbi};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tiny_keccak::{Hasher, Keccak};

use crate::error::SubscriptionError;

/// A log as delivered in the `result` of an `eth_subscription` notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    /// Set when a reorg dropped the log.
    #[serde(default)]
    pub removed: bool,
}

/// One event definition, ready for filtering and decoding.
#[derive(Debug, Clone)]
pub struct EventAbi {
    event: Event,
    signature: String,
    topic0: String,
}

impl EventAbi {
    /// Parse a single JSON fragment (`{...}`) or a full ABI array (`[...]`);
    /// the first event definition found is used.
    pub fn from_fragment(fragment: &str) -> Result<Self, SubscriptionError> {
        let trimmed = fragment.trim();
        let json = if trimmed.starts_with('{') {
            format!("[{trimmed}]")
        } else {
            trimmed.to_string()
        };
        let abi: JsonAbi = serde_json::from_str(&json)
            .map_err(|e| SubscriptionError::Abi(format!("invalid ABI JSON: {e}")))?;
        let event = abi
            .events()
            .next()
            .cloned()
            .ok_or_else(|| SubscriptionError::Abi("no event definition in ABI".into()))?;
        Ok(Self::from_event(event))
    }

    /// First fragment that yields an event; errors with the last failure.
    pub fn first_of<'a>(
        fragments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, SubscriptionError> {
        let mut last = SubscriptionError::Abi("no ABI fragments configured".into());
        for fragment in fragments {
            match Self::from_fragment(fragment) {
                Ok(abi) => return Ok(abi),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    pub fn from_event(event: Event) -> Self {
        let signature = event.signature();
        let topic0 = keccak256_hex(&signature);
        Self {
            event,
            signature,
            topic0,
        }
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// `0x`-prefixed keccak256 of the signature.
    pub fn topic0(&self) -> &str {
        &self.topic0
    }

    pub fn is_anonymous(&self) -> bool {
        self.event.anonymous
    }

    /// Decode `log` against this definition.
    pub fn decode_log(&self, log: &RawLog) -> Result<Value, SubscriptionError> {
        let mut topics = log.topics.iter();
        if !self.event.anonymous {
            let first = topics
                .next()
                .ok_or_else(|| SubscriptionError::Decode("log has no topics".into()))?;
            if !first.eq_ignore_ascii_case(&self.topic0) {
                return Err(SubscriptionError::Decode(format!(
                    "topic0 {first} does not match {}",
                    self.signature
                )));
            }
        }

        let mut fields = Map::new();
        let mut data_names = Vec::new();
        let mut data_types = Vec::new();

        for (i, param) in self.event.inputs.iter().enumerate() {
            let name = if param.name.is_empty() {
                i.to_string()
            } else {
                param.name.clone()
            };
            let ty = DynSolType::parse(&param.selector_type())
                .map_err(|e| SubscriptionError::Abi(format!("field `{name}`: {e}")))?;

            if param.indexed {
                let topic = topics.next().ok_or_else(|| {
                    SubscriptionError::Decode(format!("missing topic for indexed field `{name}`"))
                })?;
                let value = decode_topic(topic, &ty)?;
                fields.insert(name, value);
            } else {
                data_names.push(name);
                data_types.push(ty);
            }
        }

        if !data_types.is_empty() {
            let data = decode_hex(&log.data)?;
            let decoded = DynSolType::Tuple(data_types)
                .abi_decode_params(&data)
                .map_err(|e| SubscriptionError::Decode(format!("log data: {e}")))?;
            let values = match decoded {
                DynSolValue::Tuple(values) => values,
                other => vec![other],
            };
            for (name, value) in data_names.into_iter().zip(values) {
                fields.insert(name, to_json(value));
            }
        }

        Ok(json!({
            "event": self.event.name,
            "signature": self.signature,
            "address": log.address,
            "blockNumber": log.block_number.as_deref().and_then(quantity),
            "transactionHash": log.transaction_hash,
            "logIndex": log.log_index.as_deref().and_then(quantity),
            "fields": fields,
        }))
    }
}

/// keccak256 of `signature`, as `0x` hex.
pub fn keccak256_hex(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// Indexed values live in a 32-byte topic. Reference types are stored as
/// the keccak256 of their encoding and cannot be recovered, so the raw
/// topic is returned for those.
fn decode_topic(topic: &str, ty: &DynSolType) -> Result<Value, SubscriptionError> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != 32 {
        return Err(SubscriptionError::Decode(format!(
            "topic {topic} is {} bytes, expected 32",
            bytes.len()
        )));
    }
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(Value::String(format!("0x{}", hex::encode(bytes)))),
        _ => ty
            .abi_decode(&bytes)
            .map(to_json)
            .map_err(|e| SubscriptionError::Decode(format!("topic decode: {e}"))),
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, SubscriptionError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| SubscriptionError::Decode(format!("invalid hex {s:?}: {e}")))
}

/// JSON-RPC hex quantity → number.
fn quantity(s: &str) -> Option<u64> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()
}

fn to_json(value: DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..size])))
        }
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            Value::Array(values.into_iter().map(to_json).collect())
        }
        DynSolValue::Function(f) => Value::String(format!("0x{}", hex::encode(f))),
    }
}
