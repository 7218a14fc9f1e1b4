use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use usgs_api::models::SearchResponse;
use usgs_api::payloads::{
    ClearDownloads, DatasetFields, Datasets, DeletionSearch, Download, DownloadOptions, Grid2ll,
    Hits, IdLookup, Metadata, Search,
};
use usgs_api::{
    Client, DownloadResult, Downloader, MAX_DOWNLOADS, Overrides, RequestStyle, SessionStore,
    Settings, daily_window, load_credentials, load_settings, load_yaml, plan_downloads,
    search_to_download, search_to_download_options,
};

#[derive(Debug, Parser)]
#[command(
    name = "usgs",
    version,
    about = "Command line client for the USGS EarthExplorer Inventory API"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// API endpoint (overrides USGS_API_URL and .usgsapirc).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Session key file (default ~/.usgs_api_key).
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// Request style: `form` (jsonRequest field) or `header` (X-Auth-Token).
    #[arg(long, global = true)]
    style: Option<RequestStyle>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true)]
    insecure: bool,

    /// Give up on a single file transfer after this many seconds.
    #[arg(long, global = true, value_name = "SECS")]
    download_timeout: Option<u64>,

    /// API key to use instead of the saved one.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// No progress bars.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and print the new API key (saved to the key file by default).
    Login {
        /// YAML file with `username` and `password`; USGS_USERNAME/USGS_PASSWORD otherwise.
        cred_file: Option<PathBuf>,
        /// Do not write the key file.
        #[arg(long)]
        no_save: bool,
    },
    /// End the API session and remove the key file.
    Logout { apikey: Option<String> },
    /// Current status of the API endpoint.
    Status,
    /// System notifications for the current application context.
    Notifications { apikey: Option<String> },
    /// Datasets available to the user.
    Datasets { conf_file: Option<PathBuf> },
    /// Metadata filter fields of a dataset.
    Datasetfields { conf_file: PathBuf },
    /// Translate a WRS grid reference to coordinates.
    Grid2ll { conf_file: PathBuf },
    /// Translate between entity IDs and display IDs.
    Idlookup { conf_file: PathBuf },
    /// Scene search.
    Search { conf_file: PathBuf },
    /// Number of scenes a search matches.
    Hits { conf_file: PathBuf },
    /// Scenes deleted from a dataset.
    Deletionsearch { conf_file: PathBuf },
    /// Scene metadata.
    Metadata { conf_file: PathBuf },
    /// Downloadable products per scene.
    Downloadoptions { conf_file: PathBuf },
    /// Resolve download URLs (raw `download` method); feed the output to `fetch`.
    DownloadUrls { conf_file: PathBuf },
    /// Clear pending downloads from the user's queue.
    Cleardownloads { conf_file: Option<PathBuf> },
    /// Log in (or reuse the saved key), resolve URLs and download products.
    Download {
        #[arg(short = 'c', long = "credential-file")]
        credential_file: PathBuf,
        #[arg(short = 'd', long = "dataset-name")]
        dataset_name: String,
        #[arg(short = 'i', long = "entity-ids", num_args = 1.., required = true)]
        entity_ids: Vec<String>,
        #[arg(short = 'p', long = "products", num_args = 1.., required = true)]
        products: Vec<String>,
        /// Keep the API key after the run instead of logging out.
        #[arg(short = 's', long = "save-key")]
        save_key: bool,
        #[arg(short = 'f', long = "directory")]
        directory: PathBuf,
        #[arg(long, default_value_t = MAX_DOWNLOADS)]
        workers: usize,
    },
    /// Log in (or reuse the saved key) and run a search from a request file.
    SystematicSearch {
        #[arg(short = 'c', long = "credential-file")]
        credential_file: PathBuf,
        #[arg(short = 'o', long = "configuration-file")]
        configuration_file: PathBuf,
        #[arg(short = 's', long = "save-key")]
        save_key: bool,
        /// Restrict metadataUpdateFilter to yesterday..today.
        #[arg(long)]
        daily: bool,
    },
    /// Turn a saved search response into a `download-urls` request file
    /// (or a `downloadoptions` one with --options).
    SearchToDownload {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "LANDSAT_8_C1")]
        dataset: String,
        #[arg(long, num_args = 1.., default_values = ["FR_BUND", "STANDARD"], conflicts_with = "options")]
        products: Vec<String>,
        /// Write a `downloadoptions` request instead.
        #[arg(long)]
        options: bool,
    },
    /// Download every record of a saved `download-urls` response.
    Fetch {
        list: PathBuf,
        directory: PathBuf,
        #[arg(long, num_args = 1..)]
        products: Vec<String>,
        #[arg(long, default_value_t = MAX_DOWNLOADS)]
        workers: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn,usgs_api=info,usgs=info",
        1 => "warn,usgs_api=debug,usgs=debug",
        _ => "warn,usgs_api=trace,usgs=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

struct App {
    settings: Settings,
    client: Client,
    store: SessionStore,
    api_key: Option<String>,
    progress: bool,
}

impl App {
    fn key(&self, explicit: Option<String>) -> Result<String> {
        if let Some(key) = explicit.or_else(|| self.api_key.clone()) {
            return Ok(key);
        }
        match self.store.load()? {
            Some(key) => Ok(key),
            None => bail!(
                "no API key: run `usgs login` first or pass --api-key (key file {})",
                self.store.path().display()
            ),
        }
    }

    fn downloader(&self, workers: usize) -> Result<Downloader> {
        Ok(Downloader::from_settings(&self.settings)?
            .with_max_workers(workers)
            .with_progress(self.progress))
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let g = cli.global;
    let settings = load_settings(Overrides {
        url: g.url,
        key_file: g.key_file,
        verify: g.insecure.then_some(false),
        style: g.style,
        download_timeout: g.download_timeout.map(Duration::from_secs),
    })?;
    let client = Client::new(&settings)?;
    let store = SessionStore::from_settings(&settings);

    tracing::info!("USGS API endpoint is {}", client.url());
    if store.exists() {
        tracing::info!("API key file found, will try to reuse the key");
    } else {
        tracing::info!("API key file does not exist, consider running the login command first");
    }

    let app = App {
        settings,
        client,
        store,
        api_key: g.api_key,
        progress: !g.quiet && std::io::stderr().is_terminal(),
    };

    match cli.command {
        Command::Login { cred_file, no_save } => {
            let creds = load_credentials(cred_file.as_deref())?;
            let key = app.client.login(&creds)?;
            if !no_save {
                app.store.save(&key)?;
                tracing::info!(path = %app.store.path().display(), "API key saved");
            }
            println!("{}", key);
        }
        Command::Logout { apikey } => {
            let key = app.key(apikey)?;
            app.client.logout(&key)?;
            app.store.remove()?;
            tracing::info!("API session successfully ended, key file removed");
        }
        Command::Status => print_json(&app.client.status()?)?,
        Command::Notifications { apikey } => {
            let notes = app.client.notifications(&app.key(apikey)?)?;
            if notes.is_empty() {
                tracing::info!("no new notifications");
            }
            print_json(&notes)?;
        }
        Command::Datasets { conf_file } => {
            let req: Datasets = match conf_file {
                Some(path) => load_yaml(&path)?,
                None => Datasets::default(),
            };
            print_json(&app.client.datasets(&app.key(None)?, &req)?)?;
        }
        Command::Datasetfields { conf_file } => {
            let req: DatasetFields = load_yaml(&conf_file)?;
            print_json(&app.client.datasetfields(&app.key(None)?, &req)?)?;
        }
        Command::Grid2ll { conf_file } => {
            let req: Grid2ll = load_yaml(&conf_file)?;
            print_json(&app.client.grid2ll(&req)?)?;
        }
        Command::Idlookup { conf_file } => {
            let req: IdLookup = load_yaml(&conf_file)?;
            print_json(&app.client.idlookup(&app.key(None)?, &req)?)?;
        }
        Command::Search { conf_file } => {
            let req: Search = load_yaml(&conf_file)?;
            print_json(&app.client.search(&app.key(None)?, &req)?)?;
        }
        Command::Hits { conf_file } => {
            let req: Hits = load_yaml(&conf_file)?;
            print_json(&app.client.hits(&app.key(None)?, &req)?)?;
        }
        Command::Deletionsearch { conf_file } => {
            let req: DeletionSearch = load_yaml(&conf_file)?;
            print_json(&app.client.deletionsearch(&app.key(None)?, &req)?)?;
        }
        Command::Metadata { conf_file } => {
            let req: Metadata = load_yaml(&conf_file)?;
            print_json(&app.client.metadata(&app.key(None)?, &req)?)?;
        }
        Command::Downloadoptions { conf_file } => {
            let req: DownloadOptions = load_yaml(&conf_file)?;
            print_json(&app.client.downloadoptions(&app.key(None)?, &req)?)?;
        }
        Command::DownloadUrls { conf_file } => {
            let req: Download = load_yaml(&conf_file)?;
            print_json(&app.client.download(&app.key(None)?, &req)?)?;
        }
        Command::Cleardownloads { conf_file } => {
            let req: ClearDownloads = match conf_file {
                Some(path) => load_yaml(&path)?,
                None => ClearDownloads::default(),
            };
            app.client.cleardownloads(&app.key(None)?, &req)?;
            tracing::info!("pending downloads cleared");
        }
        Command::Download {
            credential_file,
            dataset_name,
            entity_ids,
            products,
            save_key,
            directory,
            workers,
        } => {
            ensure_dir(&directory)?;
            let creds = load_credentials(Some(credential_file.as_path()))?;
            let key = app.store.establish(&app.client, &creds, save_key)?;

            let request = Download {
                dataset_name,
                entity_ids,
                products: products.clone(),
            };
            let outcome = app
                .client
                .download(&key, &request)
                .context("failed to resolve download URLs")
                .and_then(|records| {
                    let items = plan_downloads(&records, &products);
                    Ok(app.downloader(workers)?.download_all(&items, &directory))
                });

            if !save_key {
                if let Err(e) = app.store.end(&app.client, &key) {
                    tracing::warn!(error = %format!("{:#}", e), "logout failed");
                }
            }
            return report(&outcome?);
        }
        Command::SystematicSearch {
            credential_file,
            configuration_file,
            save_key,
            daily,
        } => {
            let mut req: Search = load_yaml(&configuration_file)?;
            if daily {
                req.metadata_update_filter = Some(daily_window(chrono::Local::now().date_naive()));
            }
            let creds = load_credentials(Some(credential_file.as_path()))?;
            let key = app.store.establish(&app.client, &creds, save_key)?;

            let outcome = app.client.search(&key, &req);

            if !save_key {
                if let Err(e) = app.store.end(&app.client, &key) {
                    tracing::warn!(error = %format!("{:#}", e), "logout failed");
                }
            }
            let found = outcome.context("search failed")?;
            tracing::info!(total_hits = found.total_hits, returned = found.number_returned, "search complete");
            print_json(&found)?;
        }
        Command::SearchToDownload {
            input,
            output,
            dataset,
            products,
            options,
        } => {
            let search: SearchResponse = load_yaml(&input)?;
            let (text, scenes) = if options {
                let req = search_to_download_options(&search, &dataset);
                (serde_yaml::to_string(&req)?, req.entity_ids.len())
            } else {
                let req = search_to_download(&search, &dataset, &products);
                (serde_yaml::to_string(&req)?, req.entity_ids.len())
            };
            std::fs::write(&output, text)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(scenes, path = %output.display(), "request file written");
        }
        Command::Fetch {
            list,
            directory,
            products,
            workers,
        } => {
            ensure_dir(&directory)?;
            let records: Vec<usgs_api::models::DownloadRecord> = load_yaml(&list)?;
            let items = plan_downloads(&records, &products);
            let results = app.downloader(workers)?.download_all(&items, &directory);
            return report(&results);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("downloads directory not usable: {}", dir.display()))
}

fn report(results: &[DownloadResult]) -> Result<ExitCode> {
    print_json(&results)?;
    let failed = results.iter().filter(|r| !r.is_downloaded()).count();
    if failed > 0 {
        tracing::warn!(failed, total = results.len(), "some downloads failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
