// File: src/rpc/params.rs
//
// Wire-parameter decoding: JSON arrays decode element-wise against the
// method's parameter list, a JSON object decodes as a single struct-shaped
// parameter, null maps onto optional parameters

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

/// Raw parameters as they arrived in a JSON-RPC call.
#[derive(Debug, Clone)]
pub enum RpcParams {
    None,
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl RpcParams {
    /// Classify the `params` member of a request. Anything other than an
    /// array, object, null, or absence is invalid.
    pub fn from_value(params: Option<Value>) -> EngineResult<Self> {
        match params {
            None | Some(Value::Null) => Ok(RpcParams::None),
            Some(Value::Array(items)) => Ok(RpcParams::Array(items)),
            Some(Value::Object(map)) => Ok(RpcParams::Object(map)),
            Some(other) => Err(EngineError::invalid_params(format!(
                "params must be an array or object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    fn positional_len(&self) -> usize {
        match self {
            RpcParams::None => 0,
            RpcParams::Array(items) => items.len(),
            RpcParams::Object(_) => 1,
        }
    }

    /// Zero-parameter methods accept absent params or an empty array.
    pub fn expect_empty(&self) -> EngineResult<()> {
        match self {
            RpcParams::None => Ok(()),
            RpcParams::Array(items) if items.is_empty() => Ok(()),
            other => Err(EngineError::invalid_params(format!(
                "expected 0 parameters, got {}",
                other.positional_len()
            ))),
        }
    }

    /// Decode a single parameter: one array element, or the whole object
    /// when the method takes a single struct-shaped parameter.
    pub fn decode_one<P: DeserializeOwned>(&self) -> EngineResult<P> {
        match self {
            RpcParams::Array(items) => {
                if items.len() != 1 {
                    return Err(EngineError::invalid_params(format!(
                        "expected 1 parameter, got {}",
                        items.len()
                    )));
                }
                decode_element(&items[0], 0)
            }
            RpcParams::Object(map) => decode_element(&Value::Object(map.clone()), 0),
            RpcParams::None => Err(EngineError::invalid_params(
                "expected 1 parameter, got 0",
            )),
        }
    }

    pub fn decode_two<P1, P2>(&self) -> EngineResult<(P1, P2)>
    where
        P1: DeserializeOwned,
        P2: DeserializeOwned,
    {
        let items = self.positional(2)?;
        Ok((decode_element(&items[0], 0)?, decode_element(&items[1], 1)?))
    }

    pub fn decode_three<P1, P2, P3>(&self) -> EngineResult<(P1, P2, P3)>
    where
        P1: DeserializeOwned,
        P2: DeserializeOwned,
        P3: DeserializeOwned,
    {
        let items = self.positional(3)?;
        Ok((
            decode_element(&items[0], 0)?,
            decode_element(&items[1], 1)?,
            decode_element(&items[2], 2)?,
        ))
    }

    fn positional(&self, arity: usize) -> EngineResult<&[Value]> {
        match self {
            RpcParams::Array(items) if items.len() == arity => Ok(items),
            RpcParams::Array(items) => Err(EngineError::invalid_params(format!(
                "expected {} parameters, got {}",
                arity,
                items.len()
            ))),
            RpcParams::Object(_) => Err(EngineError::invalid_params(
                "object params are only valid for a single struct-shaped parameter",
            )),
            RpcParams::None => Err(EngineError::invalid_params(format!(
                "expected {} parameters, got 0",
                arity
            ))),
        }
    }
}

/// Decode one positional value; `null` decodes into `Option` parameters and
/// is rejected for anything non-nullable.
fn decode_element<P: DeserializeOwned>(value: &Value, index: usize) -> EngineResult<P> {
    serde_json::from_value(value.clone()).map_err(|e| {
        EngineError::invalid_params(format!("parameter {}: {}", index, e))
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
