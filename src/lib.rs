//! A small Rust client for the USGS EarthExplorer Inventory API.
//!
//! The crate covers the common scene workflow:
//! log in (or reuse a saved session key), search a dataset, resolve download
//! URLs, then fetch the products in parallel with [`Downloader`].
//!
//! ## Quick start
//! - Configure the endpoint via `USGS_API_URL` or a `.usgsapirc` file (the
//!   default is the public Inventory JSON API).
//! - Log in with [`Client::login`], or let a [`SessionStore`] reuse a saved key.
//!
//! ```no_run
//! use anyhow::Result;
//! use usgs_api::payloads::{Credentials, Download};
//! use usgs_api::{Client, Downloader, SessionStore, load_settings, plan_downloads};
//!
//! fn main() -> Result<()> {
//!     let settings = load_settings(Default::default())?;
//!     let client = Client::new(&settings)?;
//!     let store = SessionStore::from_settings(&settings);
//!     let key = store.establish(&client, &Credentials::new("user", "password"), true)?;
//!
//!     let products = vec!["STANDARD".to_string()];
//!     let records = client.download(
//!         &key,
//!         &Download {
//!             dataset_name: "LANDSAT_8_C1".into(),
//!             entity_ids: vec!["LC81690192018001LGN00".into()],
//!             products: products.clone(),
//!         },
//!     )?;
//!
//!     let items = plan_downloads(&records, &products);
//!     let results = Downloader::from_settings(&settings)?
//!         .download_all(&items, std::path::Path::new("."));
//!     for r in results {
//!         println!("{:?} {}", r.status, r.file_name);
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod client;
mod config;
mod download;
mod error;
mod legacy;
pub mod models;
pub mod payloads;
mod plan;
mod response;
mod session;
mod util;

pub use client::Client;
pub use config::{
    DEFAULT_ENDPOINT, Overrides, RequestStyle, Settings, load_credentials, load_settings,
    load_yaml,
};
pub use download::{
    Body, DownloadItem, DownloadResult, DownloadStatus, Downloader, Fetch, HttpFetcher,
    MAX_DOWNLOADS, Progress, lock_file_name,
};
pub use error::{ApiError, ErrorCategory, api_error};
pub use plan::{
    daily_window, display_id, file_name_for, plan_downloads, search_to_download,
    search_to_download_options,
};
pub use session::{SessionStore, key_is_valid};
