use anyhow::Result;
use std::path::Path;
use usgs_api::payloads::{Credentials, Download};
use usgs_api::{Client, Downloader, SessionStore, load_settings, plan_downloads};

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Credentials come from USGS_USERNAME / USGS_PASSWORD.
    let settings = load_settings(Default::default())?;
    let client = Client::new(&settings)?;
    let store = SessionStore::from_settings(&settings);

    let username = std::env::var("USGS_USERNAME")?;
    let password = std::env::var("USGS_PASSWORD")?;
    let key = store.establish(&client, &Credentials::new(username, password), true)?;

    let products = vec!["STANDARD".to_string()];
    let request = Download {
        dataset_name: "LANDSAT_8_C1".into(),
        entity_ids: vec![
            "LC81690192018001LGN00".into(),
            "LC81690202018001LGN00".into(),
        ],
        products: products.clone(),
    };

    let records = client.download(&key, &request)?;
    let items = plan_downloads(&records, &products);

    let out_dir = Path::new("landsat");
    std::fs::create_dir_all(out_dir)?;
    let results = Downloader::from_settings(&settings)?
        .with_max_workers(4)
        .with_progress(true)
        .download_all(&items, out_dir);

    for r in &results {
        println!("{:?}\t{}", r.status, r.file_name);
    }
    Ok(())
}
