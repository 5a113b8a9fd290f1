// Try-On Orchestrator - Main Entry Point
//
// CLI surface over the generation engine:
// - generate: run one try-on batch against the configured vendor
// - quota: evaluate an identity's current standing
// - sweep: run one upload-recovery pass
// - metrics: serve the Prometheus endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use tryon_orchestrator::auth::{AuthClaims, StaticAuthVerifier};
use tryon_orchestrator::fingerprint::{DeviceAttributes, FingerprintHasher};
use tryon_orchestrator::generation::{
    GarmentCategory, GenerationOrchestrator, GenerationRequest, GenerationVendor,
    HttpVendorClient, InMemoryAuditStore, PersonImage, PollPolicy,
};
use tryon_orchestrator::quota::{
    IdentityResolver, InMemoryLedger, IncrementCoordinator, LedgerStore, PremiumStatus,
    QuotaPolicy, RequestContext,
};
use tryon_orchestrator::storage::{
    HttpFetcher, HttpObjectStorage, LocalDirStorage, ObjectStorage, UploadQueue, UploadSweeper,
};
use tryon_orchestrator::{metrics, Config};

/// Try-On: quota-metered virtual try-on generation
#[derive(Parser, Debug)]
#[command(name = "tryon")]
#[command(author = "TryOn Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Quota-metered virtual try-on generation orchestrator", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a config file (default: XDG config dir)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one try-on batch
    Generate {
        /// Person image URLs (repeatable; one vendor task per image)
        #[arg(long = "person", required = true)]
        person_urls: Vec<String>,

        /// Garment image URL
        #[arg(long)]
        garment_url: String,

        /// Garment slot: upper_body, lower_body, or dress
        #[arg(long, default_value = "upper_body")]
        category: GarmentCategory,

        /// Device fingerprint for anonymous metering
        #[arg(long)]
        fingerprint: Option<String>,

        /// Client IP for anonymous metering
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Bearer token for authenticated metering
        #[arg(long)]
        token: Option<String>,
    },

    /// Evaluate an identity's quota standing
    Quota {
        /// Device fingerprint
        #[arg(long)]
        fingerprint: Option<String>,

        /// Client IP
        #[arg(long)]
        ip: Option<IpAddr>,

        /// Bearer token
        #[arg(long)]
        token: Option<String>,
    },

    /// Derive the device fingerprint for a set of client attributes
    Fingerprint {
        #[arg(long, default_value = "")]
        user_agent: String,

        #[arg(long, default_value = "")]
        accept_language: String,

        #[arg(long, default_value = "")]
        timezone: String,

        /// Screen geometry, e.g. 1920x1080x24
        #[arg(long, default_value = "")]
        screen: String,

        #[arg(long, default_value = "")]
        platform: String,
    },

    /// Run one upload-recovery sweep pass
    Sweep,

    /// Serve Prometheus metrics
    Metrics {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    init_logging(args.verbose, &config)?;

    match args.command {
        Some(Commands::Generate {
            person_urls,
            garment_url,
            category,
            fingerprint,
            ip,
            token,
        }) => {
            generate(
                &config,
                person_urls,
                garment_url,
                category,
                request_context(fingerprint, ip, token),
            )
            .await
        }
        Some(Commands::Quota {
            fingerprint,
            ip,
            token,
        }) => quota_status(&config, request_context(fingerprint, ip, token)).await,
        Some(Commands::Fingerprint {
            user_agent,
            accept_language,
            timezone,
            screen,
            platform,
        }) => {
            let attrs = DeviceAttributes {
                user_agent,
                accept_language,
                timezone,
                screen,
                platform,
            };
            let hasher = FingerprintHasher::new(&config.fingerprint.secret);
            println!("{}", hasher.fingerprint(&attrs));
            Ok(())
        }
        Some(Commands::Sweep) => sweep(&config).await,
        Some(Commands::Metrics { port }) => {
            let port = port.unwrap_or(config.metrics.port);
            metrics::serve(port).await
        }
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, config: &Config) -> Result<()> {
    let default_level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn request_context(
    fingerprint: Option<String>,
    ip: Option<IpAddr>,
    token: Option<String>,
) -> RequestContext {
    RequestContext {
        bearer_token: token,
        fingerprint,
        client_ip: ip,
    }
}

/// Verifier pre-loaded with the tokens from `[[auth.tokens]]`
fn build_verifier(config: &Config) -> StaticAuthVerifier {
    StaticAuthVerifier::with_tokens(config.auth.tokens.iter().map(|entry| {
        (
            entry.token.clone(),
            AuthClaims {
                user_id: entry.user_id.clone(),
                premium: if entry.premium {
                    PremiumStatus::lifetime()
                } else {
                    PremiumStatus::none()
                },
            },
        )
    }))
}

/// Wire the engine together from config.
///
/// The ledger, audit store, and upload queue are in-memory and scoped to
/// this invocation; counts and queued uploads reset between runs.
fn build_engine(config: &Config) -> GenerationOrchestrator {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
    let vendor: Arc<dyn GenerationVendor> = Arc::new(
        HttpVendorClient::new(&config.vendor.base_url, &config.vendor.api_key)
            .with_timeout(Duration::from_secs(config.vendor.timeout_secs)),
    );

    let poll_policy = PollPolicy::default()
        .interval(Duration::from_secs(config.vendor.poll_interval_secs))
        .max_attempts(config.vendor.poll_max_attempts);

    GenerationOrchestrator::new(
        IdentityResolver::new(Arc::new(build_verifier(config))),
        QuotaPolicy::new(config.quota.clone(), Arc::clone(&store)),
        IncrementCoordinator::new(config.quota.clone(), Arc::clone(&store)),
        vendor,
        poll_policy,
        Arc::new(InMemoryAuditStore::new()),
        build_storage(config),
        UploadQueue::new(),
    )
}

fn build_storage(config: &Config) -> Arc<dyn ObjectStorage> {
    if config.storage.gateway_url.is_empty() {
        Arc::new(LocalDirStorage::new(config.storage.local_dir.clone()))
    } else {
        Arc::new(HttpObjectStorage::new(
            &config.storage.gateway_url,
            &config.storage.public_base,
            &config.storage.api_key,
        ))
    }
}

async fn generate(
    config: &Config,
    person_urls: Vec<String>,
    garment_url: String,
    category: GarmentCategory,
    ctx: RequestContext,
) -> Result<()> {
    let orchestrator = build_engine(config);

    let request = GenerationRequest {
        person_images: person_urls
            .iter()
            .map(|url| {
                let name = url.rsplit('/').next().unwrap_or(url);
                PersonImage::remote(name, url)
            })
            .collect(),
        garment_url,
        category,
    };

    match orchestrator.run(&ctx, request).await {
        Ok(response) => {
            info!(
                succeeded = response.succeeded(),
                total = response.results.len(),
                "batch finished"
            );
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.code(), e);
            std::process::exit(1);
        }
    }
}

/// Print the standing the engine would evaluate for this identity.
///
/// Backed by a per-invocation in-memory ledger, so this reports the
/// fresh-identity standing; counts do not carry across runs.
async fn quota_status(config: &Config, ctx: RequestContext) -> Result<()> {
    let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
    let resolver = IdentityResolver::new(Arc::new(build_verifier(config)));
    let policy = QuotaPolicy::new(config.quota.clone(), store);

    let identity = resolver
        .resolve(&ctx)
        .await
        .map_err(|e| anyhow::anyhow!("{}: {}", e.code(), e))?;
    let status = policy
        .evaluate(&identity)
        .await
        .context("Failed to evaluate quota")?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Run one recovery pass over the upload queue.
///
/// The queue is in-memory and scoped to this invocation, so a standalone
/// run always reports an empty pass. Real entries come from a `generate`
/// run in the same process.
async fn sweep(config: &Config) -> Result<()> {
    let sweeper = UploadSweeper::new(
        UploadQueue::new(),
        build_storage(config),
        Arc::new(HttpFetcher::new()),
        config.storage.sweep_max_attempts,
    );

    let report = sweeper.run_once().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
