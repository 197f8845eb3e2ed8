//! SiteKit Smoke Harness
//!
//! Runs the cache router against a live origin: installs and activates it,
//! replays a list of URLs through it and prints a JSON summary. The cache
//! snapshot is persisted between runs, so a second run with the origin down
//! shows what the offline layer serves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use sitekit_cache::CacheStorage;
use sitekit_client::{
    ClientBridge, ClientConfig, ClientError, Registration, RegistrationOptions, ServiceWorkerHost,
};
use sitekit_common::{init_logging, LogConfig, ResultExt};
use sitekit_net::{HttpFetcher, LoaderConfig, Request, Url};
use sitekit_sw::{CacheRouter, FetchOutcome, RouterConfig};
use tracing::{error, info, warn};

/// Per-class timing collector.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();

        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            let max_ms = durations
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .fold(0.0, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "avg_ms": (total_ms / count as f64 * 100.0).round() / 100.0,
                    "max_ms": (max_ms * 100.0).round() / 100.0,
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

#[derive(Parser)]
#[command(name = "sitekit-smoke")]
#[command(about = "Replay URLs through the SiteKit cache router")]
struct Args {
    /// Origin to run against (overrides the config file)
    #[arg(long)]
    origin: Option<Url>,
    /// Router config as JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Cache snapshot, loaded before the run and saved after it
    #[arg(long, default_value = "sitekit-cache.json")]
    snapshot: PathBuf,
    /// Byte quota for cached bodies
    #[arg(long)]
    quota: Option<usize>,
    /// Delete every cache partition and exit
    #[arg(long)]
    clear: bool,
    /// Send the URLs as page navigations
    #[arg(long)]
    navigate: bool,
    /// URLs or paths relative to the origin
    urls: Vec<String>,
}

/// Host with nothing to control; registration always succeeds.
struct HeadlessHost;

#[async_trait]
impl ServiceWorkerHost for HeadlessHost {
    fn is_supported(&self) -> bool {
        true
    }

    fn has_controller(&self) -> bool {
        false
    }

    async fn register(
        &self,
        script_url: &Url,
        options: &RegistrationOptions,
    ) -> Result<Registration, ClientError> {
        let scope = script_url
            .join(&options.scope)
            .map_err(|e| ClientError::Registration(e.to_string()))?;
        Ok(Registration {
            script_url: script_url.clone(),
            scope,
        })
    }

    async fn update(&self, _registration: &Registration) -> Result<(), ClientError> {
        Ok(())
    }

    async fn unregister(&self, _registration: &Registration) -> Result<bool, ClientError> {
        Ok(true)
    }

    async fn reload(&self) {
        info!("Reload requested");
    }
}

fn load_config(args: &Args) -> sitekit_common::Result<RouterConfig> {
    let mut config = match &args.config {
        Some(path) => RouterConfig::from_json_file(path)
            .context(format!("loading router config {}", path.display()))?,
        None => RouterConfig::default(),
    };
    if let Some(origin) = &args.origin {
        config.origin = origin.clone();
    }
    config.validate()?;
    Ok(config)
}

fn fresh_storage(quota: Option<usize>) -> CacheStorage {
    match quota {
        Some(bytes) => CacheStorage::with_quota(bytes),
        None => CacheStorage::new(),
    }
}

async fn open_storage(path: &Path, quota: Option<usize>) -> CacheStorage {
    if !path.exists() {
        return fresh_storage(quota);
    }
    match CacheStorage::load_with_quota(path, quota).await {
        Ok(storage) => storage,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable cache snapshot");
            fresh_storage(quota)
        }
    }
}

async fn run(args: Args) -> sitekit_common::Result<serde_json::Value> {
    let config = load_config(&args)?;
    let storage = open_storage(&args.snapshot, args.quota).await;

    if args.clear {
        let cleared = storage.clear().await;
        storage
            .save(&args.snapshot)
            .await
            .context("saving cleared cache snapshot")?;
        return Ok(json!({ "cleared": cleared }));
    }

    let fetcher = Arc::new(HttpFetcher::new(LoaderConfig {
        default_timeout: config.fetch_timeout(),
        ..Default::default()
    })?);

    let bridge = ClientBridge::new(
        ClientConfig {
            origin: config.origin.clone(),
            enabled: true,
            ..Default::default()
        },
        Arc::new(HeadlessHost),
        fetcher.clone(),
    );
    let router = CacheRouter::new(config.clone(), storage.clone(), fetcher)?;

    let started = Instant::now();
    let (installed, activated) = router.start().await?;
    info!(
        cached = installed.cached.len(),
        deleted = activated.deleted.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Router ready"
    );
    bridge.register_if_supported().await;

    let mut perf = PerfTiming::default();
    let mut requests = Vec::new();
    for raw in &args.urls {
        let url = config.resolve(raw)?;
        let request = if args.navigate {
            Request::navigate(url)
        } else {
            Request::get(url)
        };

        let started = Instant::now();
        let outcome = router.handle_fetch(&request).await;
        let elapsed = started.elapsed();

        let entry = match outcome {
            Ok(FetchOutcome::Respond { class, response }) => {
                perf.record(class.as_str(), elapsed);
                json!({
                    "url": request.url.as_str(),
                    "class": class,
                    "status": response.status.as_u16(),
                    "source": response.source,
                    "bytes": response.body.len(),
                })
            }
            Ok(FetchOutcome::PassThrough) => {
                perf.record("pass-through", elapsed);
                json!({ "url": request.url.as_str(), "pass_through": true })
            }
            Err(e) => {
                error!(url = %request.url, error = %e, "Request failed");
                json!({ "url": request.url.as_str(), "error": e.to_string() })
            }
        };
        requests.push(entry);
    }

    storage
        .save(&args.snapshot)
        .await
        .context(format!("saving cache snapshot {}", args.snapshot.display()))?;
    let usage = storage.usage().await;

    Ok(json!({
        "version": config.version,
        "state": router.state(),
        "installed": installed,
        "activated": activated,
        "client": bridge.status(),
        "requests": requests,
        "timings": perf.summary(),
        "cache": {
            "summary": usage.summary(),
            "usage": usage,
        },
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> sitekit_common::Result<()> {
    init_logging(LogConfig::from_env());

    let args = Args::parse();
    info!(urls = args.urls.len(), snapshot = %args.snapshot.display(), "Starting smoke run");

    let result = run(args).await?;
    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
    Ok(())
}
