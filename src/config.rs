use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::payloads::Credentials;

pub const DEFAULT_ENDPOINT: &str = "https://earthexplorer.usgs.gov/inventory/json/v/1.4.1";
pub(crate) const KEY_FILE_NAME: &str = ".usgs_api_key";
const RC_FILE_NAME: &str = ".usgsapirc";

/// How the payload and API key travel to the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestStyle {
    /// Form field `jsonRequest` carrying the JSON payload, key inside the payload.
    #[default]
    Form,
    /// JSON body, key in the `X-Auth-Token` header.
    Header,
}

impl FromStr for RequestStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "form" | "legacy" | "jsonrequest" => Ok(RequestStyle::Form),
            "header" | "json" | "token" => Ok(RequestStyle::Header),
            other => bail!("unknown request style [{}] (expected `form` or `header`)", other),
        }
    }
}

/// Process-wide settings, resolved once and passed to whoever needs them.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base API URL; method names are appended to it.
    pub url: String,
    /// File holding the saved session key.
    pub key_file: PathBuf,
    /// Whether to verify TLS certificates.
    pub verify: bool,
    pub style: RequestStyle,
    /// Timeout for API calls (not for downloads).
    pub timeout: Duration,
    /// Limit on a single file transfer; `None` waits indefinitely.
    pub download_timeout: Option<Duration>,
}

impl Settings {
    /// Settings with every field at its default, without consulting the
    /// environment or any rc file.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_file: default_key_file(),
            verify: true,
            style: RequestStyle::default(),
            timeout: Duration::from_secs(60),
            download_timeout: None,
        }
    }
}

/// Explicit values that take precedence over the environment and rc files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub key_file: Option<PathBuf>,
    pub verify: Option<bool>,
    pub style: Option<RequestStyle>,
    pub download_timeout: Option<Duration>,
}

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key_file: Option<String>,
    verify: Option<bool>,
    style: Option<String>,
}

/// Resolves settings from (in order of precedence) explicit overrides,
/// `USGS_API_URL` / `USGS_KEY_FILE` / `USGS_API_STYLE`, the first rc file
/// found, and built-in defaults.
pub fn load_settings(overrides: Overrides) -> Result<Settings> {
    let mut url = overrides.url.or_else(|| env_nonempty("USGS_API_URL"));
    let mut key_file = overrides
        .key_file
        .or_else(|| env_nonempty("USGS_KEY_FILE").map(PathBuf::from));
    let mut style = match overrides.style {
        Some(s) => Some(s),
        None => env_nonempty("USGS_API_STYLE")
            .map(|s| s.parse::<RequestStyle>())
            .transpose()
            .context("invalid USGS_API_STYLE")?,
    };
    let mut verify = overrides.verify;

    if url.is_none() || key_file.is_none() || style.is_none() || verify.is_none() {
        for rc_path in rc_candidates() {
            if !rc_path.exists() {
                continue;
            }
            let cfg = read_rc(&rc_path).with_context(|| {
                format!("failed to read configuration file {}", rc_path.display())
            })?;
            tracing::debug!(path = %rc_path.display(), "loaded rc file");

            if url.is_none() {
                url = cfg.url;
            }
            if key_file.is_none() {
                key_file = cfg.key_file.map(|p| expand_home(&p));
            }
            if style.is_none() {
                style = cfg
                    .style
                    .map(|s| s.parse::<RequestStyle>())
                    .transpose()
                    .with_context(|| format!("invalid style in {}", rc_path.display()))?;
            }
            if verify.is_none() {
                verify = cfg.verify;
            }
            break;
        }
    }

    let url = url.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("invalid API URL [{}]: expected an http(s) URL", url);
    }

    Ok(Settings {
        url: url.trim_end_matches('/').to_string(),
        key_file: key_file.unwrap_or_else(default_key_file),
        verify: verify.unwrap_or(true),
        style: style.unwrap_or_default(),
        timeout: Duration::from_secs(60),
        download_timeout: overrides.download_timeout,
    })
}

/// Reads a YAML credentials file (`username`, `password`, optional payload
/// fields). Without a file, `USGS_USERNAME` / `USGS_PASSWORD` are used.
pub fn load_credentials(path: Option<&Path>) -> Result<Credentials> {
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read credential file {}", path.display()))?;
        return serde_yaml::from_str(&text)
            .with_context(|| format!("invalid credential file {}", path.display()));
    }

    match (env_nonempty("USGS_USERNAME"), env_nonempty("USGS_PASSWORD")) {
        (Some(user), Some(pass)) => Ok(Credentials::new(user, pass)),
        _ => bail!(
            "Missing credentials: pass a credential file or set USGS_USERNAME and USGS_PASSWORD"
        ),
    }
}

/// Loads any YAML request file into the payload record `T`.
pub fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_rc(&text)
}

fn parse_rc(text: &str) -> Result<RcConfig> {
    let mut cfg = RcConfig::default();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let v = strip_quotes(v.trim());
        if v.is_empty() {
            continue;
        }
        match k.trim() {
            "url" => cfg.url = Some(v.to_string()),
            "key_file" => cfg.key_file = Some(v.to_string()),
            "style" => cfg.style = Some(v.to_string()),
            "verify" => cfg.verify = Some(!matches!(v, "0" | "false" | "no")),
            _ => {}
        }
    }

    Ok(cfg)
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn expand_home(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(p)
}

pub(crate) fn default_key_file() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(KEY_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(KEY_FILE_NAME))
}

fn rc_candidates() -> Vec<PathBuf> {
    // 1) USGS_API_RC (explicit)
    // 2) ./.usgsapirc
    // 3) ~/.usgsapirc
    if let Ok(p) = std::env::var("USGS_API_RC") {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(RC_FILE_NAME));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(RC_FILE_NAME));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rc_lines() {
        let cfg = parse_rc(
            "# usgs settings\nurl: \"https://example.test/api\"\nverify: 0\nstyle: header\nkey_file: '/tmp/key'\nunknown: x\n",
        )
        .unwrap();
        assert_eq!(cfg.url.as_deref(), Some("https://example.test/api"));
        assert_eq!(cfg.verify, Some(false));
        assert_eq!(cfg.style.as_deref(), Some("header"));
        assert_eq!(cfg.key_file.as_deref(), Some("/tmp/key"));
    }

    #[test]
    fn explicit_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(Overrides {
            url: Some("http://127.0.0.1:9/api/".into()),
            key_file: Some(dir.path().join("key")),
            verify: Some(false),
            style: Some(RequestStyle::Header),
            download_timeout: Some(Duration::from_secs(900)),
        })
        .unwrap();
        assert_eq!(settings.url, "http://127.0.0.1:9/api");
        assert_eq!(settings.key_file, dir.path().join("key"));
        assert!(!settings.verify);
        assert_eq!(settings.style, RequestStyle::Header);
        assert_eq!(settings.download_timeout, Some(Duration::from_secs(900)));
    }

    #[test]
    fn rejects_non_http_url() {
        let err = load_settings(Overrides {
            url: Some("ftp://example.test".into()),
            key_file: Some(PathBuf::from("k")),
            verify: Some(true),
            style: Some(RequestStyle::Form),
            download_timeout: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("invalid API URL"));
    }

    #[test]
    fn style_names() {
        assert_eq!("form".parse::<RequestStyle>().unwrap(), RequestStyle::Form);
        assert_eq!("Header".parse::<RequestStyle>().unwrap(), RequestStyle::Header);
        assert!("soap".parse::<RequestStyle>().is_err());
    }

    #[test]
    fn credentials_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.yaml");
        std::fs::write(&path, "username: bob\npassword: s3cret\ncatalogId: HDDS\n").unwrap();
        let creds = load_credentials(Some(path.as_path())).unwrap();
        assert_eq!(creds.username, "bob");
        assert_eq!(creds.catalog_id, "HDDS");
        assert_eq!(creds.auth_type, "EROS");
    }
}
