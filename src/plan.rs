//! Turning API results into download work.

use chrono::{Days, NaiveDate};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::download::DownloadItem;
use crate::models::{DownloadRecord, SearchResponse, TemporalFilter};
use crate::payloads::{Download, DownloadOptions};
use crate::util::guess_filename_from_url;

/// Landsat Collection 1 product identifier, e.g.
/// `LC08_L1TP_169019_20180101_20180104_01_T1`.
static DISPLAY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"L[COT]\d{2}_(L1GT|L1GS|L1TP)_\d{6}_\d{8}_\d{8}_\d{2}_(RT|T1|T2)")
        .expect("display id pattern")
});

pub fn display_id(url: &str) -> Option<&str> {
    DISPLAY_ID.find(url).map(|m| m.as_str())
}

/// Output file name for a download record, or `None` when it has no URL or
/// nothing to name the file after.
pub fn file_name_for(record: &DownloadRecord) -> Option<String> {
    let url = record.url.as_deref()?;
    let stem = display_id(url)
        .map(str::to_string)
        .or_else(|| record.entity_id.clone());
    let product = record.product_type();

    match product {
        Some("FR_BUND") => stem.map(|s| format!("{}.zip", s)),
        Some("STANDARD") => stem.map(|s| format!("{}.tar.gz", s)),
        _ => guess_filename_from_url(url).or_else(|| {
            stem.map(|s| match product {
                Some(p) => format!("{}.{}", s, p.to_ascii_lowercase()),
                None => s,
            })
        }),
    }
}

/// Download descriptors for `records`, keeping only the listed `products`
/// (all of them when the list is empty).
pub fn plan_downloads(records: &[DownloadRecord], products: &[String]) -> Vec<DownloadItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(records.len());

    for record in records {
        if !products.is_empty() {
            let wanted = record
                .product_type()
                .is_some_and(|p| products.iter().any(|w| w.eq_ignore_ascii_case(p)));
            if !wanted {
                tracing::debug!(product = ?record.product_type(), entity = ?record.entity_id, "skipping unrequested product");
                continue;
            }
        }

        let (Some(url), Some(file_name)) = (record.url.as_deref(), file_name_for(record)) else {
            tracing::warn!(entity = ?record.entity_id, error = ?record.error, "no usable download URL, skipping");
            continue;
        };

        if !seen.insert(file_name.clone()) {
            tracing::warn!(file = %file_name, "duplicate output file name, skipping");
            continue;
        }

        tracing::debug!(%url, file = %file_name, "adding entry to the download list");
        items.push(DownloadItem::new(url, file_name));
    }

    items
}

/// `download` request for every scene of a search response.
pub fn search_to_download(
    search: &SearchResponse,
    dataset_name: &str,
    products: &[String],
) -> Download {
    Download {
        dataset_name: dataset_name.to_string(),
        entity_ids: search.entity_ids(),
        products: products.to_vec(),
    }
}

/// `downloadoptions` request for every scene of a search response.
pub fn search_to_download_options(search: &SearchResponse, dataset_name: &str) -> DownloadOptions {
    DownloadOptions {
        dataset_name: dataset_name.to_string(),
        entity_ids: search.entity_ids(),
    }
}

/// Metadata-update window covering the day before `today` up to `today`.
pub fn daily_window(today: NaiveDate) -> TemporalFilter {
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    TemporalFilter {
        start_date: yesterday.format("%Y-%m-%d").to_string(),
        end_date: today.format("%Y-%m-%d").to_string(),
        date_field: None,
    }
}
