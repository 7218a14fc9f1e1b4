use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::config::{Overrides, RequestStyle, Settings, load_settings};
use crate::error::format_http_error;
use crate::legacy::{form_request, payload_with_key};
use crate::models::{
    Dataset, DatasetField, DeletionSearchResponse, DownloadRecord, GridShape, IdLookupResult,
    Notification, SceneDownloadOptions, SceneMetadata, SearchResponse, Status,
};
use crate::payloads::{
    ClearDownloads, Credentials, DatasetFields, Datasets, DeletionSearch, Download,
    DownloadOptions, Grid2ll, Hits, IdLookup, Metadata, Search,
};
use crate::response::{Envelope, Reply};
use crate::util::{backoff, method_url, retriable_status};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Blocking client for the Inventory API.
///
/// Every method is an HTTP POST to `<url>/<method>`. Methods that need a
/// session take the API key explicitly; obtain one with [`Client::login`] or
/// from a [`SessionStore`](crate::SessionStore).
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    style: RequestStyle,

    retry_max: usize,
    sleep_max: Duration,

    http: HttpClient,
}

impl Client {
    /// Creates a client from the environment and/or `.usgsapirc`.
    pub fn from_env() -> Result<Self> {
        Self::new(&load_settings(Overrides::default())?)
    }

    pub fn new(settings: &Settings) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("usgs-api-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("usgs-api-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(settings.timeout);

        if !settings.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            url: settings.url.trim_end_matches('/').to_string(),
            style: settings.style,
            retry_max: 3,
            sleep_max: Duration::from_secs(10),
            http,
        })
    }

    /// Total attempts per API call for transient failures (1 = no retry).
    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max.max(1);
        self
    }

    pub fn with_sleep_max(mut self, sleep_max: Duration) -> Self {
        self.sleep_max = sleep_max;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn style(&self) -> RequestStyle {
        self.style
    }

    /// Authenticates and returns a new API key (valid for about an hour).
    pub fn login(&self, credentials: &Credentials) -> Result<String> {
        self.call("login", None, credentials)
    }

    /// Invalidates `api_key`. Returns the server's confirmation flag.
    pub fn logout(&self, api_key: &str) -> Result<bool> {
        let data: Value = self.call("logout", Some(api_key), &())?;
        Ok(data.as_bool().unwrap_or(true))
    }

    pub fn status(&self) -> Result<Status> {
        self.call("status", None, &())
    }

    pub fn notifications(&self, api_key: &str) -> Result<Vec<Notification>> {
        let data: Option<Vec<Notification>> = self.call("notifications", Some(api_key), &())?;
        Ok(data.unwrap_or_default())
    }

    pub fn datasets(&self, api_key: &str, request: &Datasets) -> Result<Vec<Dataset>> {
        self.call("datasets", Some(api_key), request)
    }

    pub fn datasetfields(
        &self,
        api_key: &str,
        request: &DatasetFields,
    ) -> Result<Vec<DatasetField>> {
        self.call("datasetfields", Some(api_key), request)
    }

    /// Grid reference to coordinates. Needs no session.
    pub fn grid2ll(&self, request: &Grid2ll) -> Result<GridShape> {
        self.call("grid2ll", None, request)
    }

    pub fn idlookup(&self, api_key: &str, request: &IdLookup) -> Result<IdLookupResult> {
        self.call("idlookup", Some(api_key), request)
    }

    pub fn search(&self, api_key: &str, request: &Search) -> Result<SearchResponse> {
        self.call("search", Some(api_key), request)
    }

    /// Number of scenes a search would match.
    pub fn hits(&self, api_key: &str, request: &Hits) -> Result<u64> {
        self.call("hits", Some(api_key), request)
    }

    pub fn deletionsearch(
        &self,
        api_key: &str,
        request: &DeletionSearch,
    ) -> Result<DeletionSearchResponse> {
        self.call("deletionsearch", Some(api_key), request)
    }

    pub fn metadata(&self, api_key: &str, request: &Metadata) -> Result<Vec<SceneMetadata>> {
        self.call("metadata", Some(api_key), request)
    }

    /// Resolves download URLs for the requested scenes and products.
    pub fn download(&self, api_key: &str, request: &Download) -> Result<Vec<DownloadRecord>> {
        self.call("download", Some(api_key), request)
    }

    pub fn downloadoptions(
        &self,
        api_key: &str,
        request: &DownloadOptions,
    ) -> Result<Vec<SceneDownloadOptions>> {
        self.call("downloadoptions", Some(api_key), request)
    }

    /// Clears pending downloads from the user's queue. The API returns no data.
    pub fn cleardownloads(&self, api_key: &str, request: &ClearDownloads) -> Result<()> {
        let _: Value = self.call("cleardownloads", Some(api_key), request)?;
        Ok(())
    }

    /// Calls any API method and decodes the `data` field of the response.
    ///
    /// A response carrying an `errorCode` becomes an [`ApiError`](crate::ApiError)
    /// inside the returned `anyhow::Error`.
    pub fn call<TReq: Serialize, TResp: DeserializeOwned>(
        &self,
        method: &str,
        api_key: Option<&str>,
        request: &TReq,
    ) -> Result<TResp> {
        let url = method_url(&self.url, method);
        tracing::debug!(%url, "API call");

        let resp = match self.style {
            RequestStyle::Form => {
                let form = form_request(request, api_key)?;
                log_payload(method, &form[0].1);
                self.robust_request(|| self.http.post(&url).form(&form).send())?
            }
            RequestStyle::Header => {
                let body = payload_with_key(request, None)?;
                log_payload(method, &body.to_string());
                self.robust_request(|| {
                    let mut req: RequestBuilder = self.http.post(&url).json(&body);
                    if let Some(key) = api_key {
                        req = req.header(AUTH_TOKEN_HEADER, key.trim());
                    }
                    req.send()
                })?
            }
        };

        let status = resp.status();
        let text = resp.text().unwrap_or_default();

        // Error envelopes are honoured whatever the HTTP status.
        let envelope = match serde_json::from_str::<Envelope>(&text) {
            Ok(env) if status.is_success() || env.error_code.is_some() => env,
            Ok(_) => return Err(format_http_error(status, &url, &text)),
            Err(_) if !status.is_success() => return Err(format_http_error(status, &url, &text)),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to parse API JSON (url={}, status={})", url, status)
                });
            }
        };

        tracing::trace!(%url, response = %text, "API response");
        if let Some(secs) = envelope.execution_time {
            tracing::debug!(method, execution_time = secs, api_version = ?envelope.api_version, "API call complete");
        }

        match envelope
            .into_reply::<TResp>()
            .with_context(|| format!("failed to decode `{}` response data (url={})", method, url))?
        {
            Reply::Data(data) => Ok(data),
            Reply::Failed(err) => {
                tracing::debug!(method, code = %err.code, "API returned error");
                Err(err.into())
            }
        }
    }

    fn robust_request<F>(&self, mut f: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let mut tries = 0usize;
        let mut sleep = Duration::ZERO;
        loop {
            let result = f();
            tries += 1;

            match result {
                Ok(resp) => {
                    if retriable_status(resp.status().as_u16()) && tries < self.retry_max {
                        sleep = backoff(sleep, self.sleep_max);
                        tracing::warn!(status = %resp.status(), attempt = tries, "transient HTTP status, retrying in {:?}", sleep);
                        thread::sleep(sleep);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if tries >= self.retry_max {
                        return Err(err).context("could not connect");
                    }
                    sleep = backoff(sleep, self.sleep_max);
                    tracing::warn!(error = %err, attempt = tries, "request failed, retrying in {:?}", sleep);
                    thread::sleep(sleep);
                }
            }
        }
    }
}

fn log_payload(method: &str, body: &str) {
    if method == "login" {
        tracing::debug!("API call payload hidden");
    } else {
        tracing::debug!(payload = %body, "API call payload");
    }
}
