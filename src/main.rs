use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use vigil::config::Config;
use vigil::notify::{NotificationDispatcher, TerminalNotifier};
use vigil::push::{ConnectionManager, PushConfig, PushEvent};
use vigil::storage::{AssetStore, CacheError, FeedCache};
use vigil::sync::{build_http_client, PublishClient, SyncClient};

/// Get the config directory path (~/.config/vigil/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("vigil"))
}

/// Get the data directory path (~/.local/share/vigil/), unless overridden.
fn get_data_dir(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.data_dir {
        return Ok(dir.clone());
    }
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".local").join("share").join("vigil"))
}

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Offline-first client for a care-alert post feed")]
struct Args {
    /// Path to an alternative config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the locally cached feed without touching the network
    Show,
    /// Fetch the latest posts and replace the local cache
    Sync,
    /// Submit a new post with an image attachment
    Publish {
        #[arg(long)]
        title: String,
        #[arg(long)]
        text: String,
        /// Path to the image file to attach
        #[arg(long, value_name = "FILE")]
        image: PathBuf,
    },
    /// Keep a push connection open and raise notifications for alerts
    Watch,
}

fn build_sync_client(config: &Config, data_dir: &std::path::Path) -> Result<SyncClient> {
    let token = config
        .auth_token()
        .context("No auth token configured (set auth_token in config.toml or VIGIL_TOKEN)")?;
    let http = build_http_client(config.http_timeout()).context("Failed to build HTTP client")?;
    Ok(SyncClient::new(
        http,
        FeedCache::open(data_dir.join("snapshot.json")),
        AssetStore::open(data_dir.join("assets")),
        config.api_endpoint()?,
        token,
        config.http_timeout(),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => {
            let config_dir = get_config_dir()?;
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config_dir.join("config.toml")
        }
    };
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let data_dir = get_data_dir(&config)?;
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    match args.command {
        Command::Show => {
            let cache = FeedCache::open(data_dir.join("snapshot.json"));
            let assets = AssetStore::open(data_dir.join("assets"));
            match cache.load() {
                Ok(snapshot) => {
                    println!(
                        "{} posts (fetched {})",
                        snapshot.len(),
                        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                    for post in &snapshot.posts {
                        let image_note = match &post.image {
                            Some(url) => {
                                let cached = vigil::util::asset_key(url)
                                    .map(|key| assets.contains(&key))
                                    .unwrap_or(false);
                                if cached {
                                    " [image cached]"
                                } else {
                                    " [image not cached]"
                                }
                            }
                            None => "",
                        };
                        println!(
                            "#{} {} ({}){}",
                            post.id, post.title, post.published_date, image_note
                        );
                    }
                }
                Err(CacheError::NotFound) => {
                    println!("No cached feed yet. Run `vigil sync` first.");
                }
                Err(e) => return Err(e).context("Failed to read cached feed"),
            }
        }

        Command::Sync => {
            let client = build_sync_client(&config, &data_dir)?;
            match client.refresh().await {
                Ok(snapshot) => println!("Synchronized {} posts.", snapshot.len()),
                Err(e) => {
                    eprintln!("Sync failed: {e}");
                    eprintln!("The previously cached feed is unchanged.");
                    std::process::exit(1);
                }
            }
        }

        Command::Publish { title, text, image } => {
            let token = config
                .auth_token()
                .context("No auth token configured (set auth_token in config.toml or VIGIL_TOKEN)")?;
            let http =
                build_http_client(config.http_timeout()).context("Failed to build HTTP client")?;
            let client = PublishClient::new(
                http,
                config.api_endpoint()?,
                token,
                config.author_id.clone(),
                config.http_timeout(),
            );
            match client.publish(&title, &text, &image).await {
                Ok(()) => println!("Published. Run `vigil sync` to see the new post."),
                Err(e) => {
                    eprintln!("Publish failed: {e}");
                    std::process::exit(1);
                }
            }
        }

        Command::Watch => {
            let sync_client = Arc::new(build_sync_client(&config, &data_dir)?);
            let dispatcher = NotificationDispatcher::new(TerminalNotifier);

            let push_config = PushConfig {
                url: config.ws_endpoint()?.to_string(),
                reconnect_delay: config.reconnect_delay(),
                ping_interval: config.ping_interval(),
            };
            let (handle, mut events) = ConnectionManager::spawn(push_config);
            println!("Watching for alerts (Ctrl-C to stop)...");

            loop {
                tokio::select! {
                    maybe_event = events.recv() => {
                        let Some(event) = maybe_event else { break };
                        dispatcher.on_event(&event);
                        // An alert references a new post; pull it into the
                        // local cache so the feed is current when opened.
                        if matches!(event, PushEvent::AlertRaised { .. }) {
                            let client = Arc::clone(&sync_client);
                            tokio::spawn(async move {
                                if let Err(e) = client.refresh().await {
                                    tracing::warn!(error = %e, "Post-alert refresh failed");
                                }
                            });
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("Stopping...");
                        break;
                    }
                }
            }

            handle.stop().await;
        }
    }

    Ok(())
}
