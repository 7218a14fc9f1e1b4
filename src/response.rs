use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// Raw response envelope shared by every Inventory API method.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct Envelope {
    #[serde(default, rename = "errorCode")]
    pub(crate) error_code: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) data: Value,
    #[serde(default)]
    pub(crate) api_version: Option<String>,
    #[serde(default, rename = "executionTime")]
    pub(crate) execution_time: Option<f64>,
}

/// Outcome of one API call, decoded once at the call boundary.
#[derive(Debug)]
pub(crate) enum Reply<T> {
    Data(T),
    Failed(ApiError),
}

impl Envelope {
    pub(crate) fn into_reply<T: DeserializeOwned>(self) -> Result<Reply<T>, serde_json::Error> {
        match self.error_code {
            Some(code) if !code.is_empty() => Ok(Reply::Failed(ApiError::new(
                code,
                self.error.unwrap_or_default(),
            ))),
            _ => serde_json::from_value(self.data).map(Reply::Data),
        }
    }
}
