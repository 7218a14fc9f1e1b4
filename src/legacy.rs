use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::Value;

/// Builds the single form field the legacy Inventory API expects:
/// `jsonRequest=<payload as JSON>`, with `apiKey` folded into the payload.
pub(crate) fn form_request<T: Serialize>(
    payload: &T,
    api_key: Option<&str>,
) -> Result<[(&'static str, String); 1]> {
    let value = payload_with_key(payload, api_key)?;
    Ok([("jsonRequest", serde_json::to_string(&value)?)])
}

pub(crate) fn payload_with_key<T: Serialize>(payload: &T, api_key: Option<&str>) -> Result<Value> {
    let mut value = serde_json::to_value(payload)?;
    // `status` has no parameters; it still sends `{}`.
    if value.is_null() {
        value = Value::Object(Default::default());
    }

    if let Some(key) = api_key {
        match value.as_object_mut() {
            Some(obj) => {
                obj.insert("apiKey".to_string(), Value::String(key.to_string()));
            }
            None => bail!("request payload must be a JSON object"),
        }
    }

    Ok(value)
}
