use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;

mod models;
mod repositories;
pub mod services;
pub mod settings;

use repositories::firebase::FirebaseStore;
use repositories::memory::MemoryStore;
use repositories::store::DocumentStore;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log4rs).expect("Failed to initialize logging.");

    let settings = settings::Settings::load(&args.config).expect("Could not load config file.");
    let store = build_store(&settings).expect("Could not initialize document store.");

    log::info!("Starting EarnHub API ({} store).", settings.store.backend);
    services::start_services(store, settings, &args.listen)
        .await
        .expect("Could not start services.");
}

fn build_store(settings: &settings::Settings) -> Result<Arc<dyn DocumentStore>, anyhow::Error> {
    match settings.store.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "firebase" => {
            let auth = if settings.store.firebase_auth.is_empty() {
                None
            } else {
                Some(settings.store.firebase_auth.clone())
            };
            Ok(Arc::new(FirebaseStore::new(&settings.store.firebase_url, auth)?))
        }
        other => anyhow::bail!("Unknown store backend: {}", other),
    }
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
