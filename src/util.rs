use std::time::Duration;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    let next = Duration::from_secs_f64((current.as_secs_f64() * 1.5).max(1.0));
    if next > max { max } else { next }
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path
        .strip_prefix("http://")
        .or_else(|| path.strip_prefix("https://"))
        .map(|rest| rest.split_once('/').map(|(_, p)| p).unwrap_or(""))
        .unwrap_or(path);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    })
}

pub(crate) fn method_url(base: &str, method: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        method.trim_start_matches('/')
    )
}

/// Shortened key for log lines.
pub(crate) fn mask_key(key: &str) -> String {
    let key = key.trim();
    if key.len() <= 8 || !key.is_ascii() {
        return "****".to_string();
    }
    format!("{}…{}", &key[..4], &key[key.len() - 4..])
}
