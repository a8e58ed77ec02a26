use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use cdn_director::{
    adapters::{
        AppState, HealthPoller, HttpClientAdapter, MemoryRegistryStore, MemorySetStore,
        build_router,
    },
    config::models::DirectorConfig,
    core::{
        CdnRegistry, DirectorService, SelectionEngine, SlidingWindowLimiter, SpecialSetCache,
        TrustedHosts, director::DirectorPolicy,
    },
    ports::{http_client::HttpClient, leadership::StaticLeader},
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the director server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    // Determine the command to run
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            This can happen if a provider was already installed. \
            The application will proceed; ensure a crypto provider is effectively available.",
            e
        );
    }

    // Configure tracing_subscriber for JSON output
    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");

    let config: DirectorConfig = cdn_director::config::loader::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    cdn_director::config::DirectorConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration: {}", e))?;

    // Assemble the core from its components. The registry and special set sit
    // on in-process stores; replicas wanting a shared view plug a different
    // store adapter in here.
    let registry = Arc::new(CdnRegistry::new(
        Arc::new(MemoryRegistryStore::new()),
        config.poller.fail_threshold(),
    ));
    let selection = Arc::new(SelectionEngine::new(
        Duration::from_millis(config.selection.cache_ttl_millis),
        config.selection.tolerance,
    ));
    let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(
        config.rate_limit.window_secs,
    )));
    let special = Arc::new(SpecialSetCache::new(
        Arc::new(MemorySetStore::new()),
        config.special.set_name.clone(),
    ));
    let trust = Arc::new(TrustedHosts::new(config.referrer_allowlist.clone()));

    let director = Arc::new(DirectorService::new(
        registry,
        selection,
        limiter,
        special,
        trust,
        DirectorPolicy {
            max_requests_per_ip: config.rate_limit.max_requests_per_ip,
            window_seconds: config.rate_limit.window_secs,
            redirect_code: config.redirect_code,
            delivery: config.delivery,
            override_destination: config.override_destination.clone(),
        },
    ));

    // Seed backends from configuration
    if !config.cdns.is_empty() {
        let report = director
            .register_backends(&config.cdns)
            .await
            .map_err(|e| eyre!("Failed to seed backends from config: {}", e))?;
        tracing::info!(
            "Seeded {} backends from config ({} skipped)",
            report.added.len(),
            report.skipped.len()
        );
    }

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);

    // Health poller (leader replicas only)
    let poller = HealthPoller::new(
        director.clone(),
        http_client.clone(),
        Arc::new(StaticLeader(config.poller.leader)),
        Duration::from_secs(config.poller.interval_secs),
        config.poller.probe_timeout_secs,
        config.poller.concurrency,
    );
    tokio::spawn(async move {
        if let Err(e) = poller.run().await {
            tracing::error!("Health poller exited with error: {}", e);
        }
    });

    // Special-set refresher
    {
        let special = director.special().clone();
        let refresh_interval = Duration::from_secs(config.special.refresh_interval_secs);
        tokio::spawn(async move {
            special.run_refresher(refresh_interval).await;
        });
    }

    // Rate-limiter janitor
    {
        let limiter = director.limiter().clone();
        let sweep_interval = Duration::from_secs(config.rate_limit.sweep_interval_secs);
        tokio::spawn(async move {
            limiter.run_janitor(sweep_interval).await;
        });
    }

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    // Start signal handler for graceful shutdown
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let app = build_router(AppState {
        director,
        http_client,
        admin_key: Arc::from(config.admin_key.as_str()),
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!(
        "Starting CDN Director on {} (delivery: {:?}, poll interval: {}s, fail threshold: {})",
        config.listen_addr,
        config.delivery,
        config.poller.interval_secs,
        config.poller.fail_threshold()
    );

    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result.context("Server error")?;
        },
        shutdown_reason = graceful_shutdown.wait_for_shutdown_signal() => {
            tracing::info!("Shutdown signal received: {:?}", shutdown_reason);
            tracing::info!("Graceful shutdown completed");
        }
    }

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use cdn_director::config::{DirectorConfigValidator, loader::load_config};

    println!("🔍 Validating configuration file: {config_path}");

    // First check if file exists and is readable
    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    // Try to parse the configuration
    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    // Validate the configuration
    match DirectorConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Seed Backends: {}", config.cdns.len());
            println!("   • Delivery: {:?}", config.delivery);
            println!(
                "   • Poll Interval: {}s (fail threshold {})",
                config.poller.interval_secs,
                config.poller.fail_threshold()
            );
            println!(
                "   • Rate Limit: {} requests / {}s",
                config.rate_limit.max_requests_per_ip, config.rate_limit.window_secs
            );
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure backend URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Use a redirect status code of 301, 302, 307, or 308");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# CDN Director Configuration

# The address to listen on
listen_addr = "0.0.0.0:8080"

# Key required in the X-Admin-Key header for admin endpoints
admin_key = "change-me"

# Where special hashes and untrusted referrers are sent
override_destination = "https://fallback.example.com"

# Backends registered at startup
cdns = [
    # "http://cdn1.example.com",
    # "http://cdn2.example.com",
]

# Referrer domains trusted in addition to backend hostnames
referrer_allowlist = []

[poller]
interval_secs = 10
probe_timeout_secs = 4
eviction_grace_secs = 30
leader = true

[rate_limit]
max_requests_per_ip = 10
window_secs = 18000

[selection]
cache_ttl_millis = 2000
tolerance = 1

[special]
set_name = "special_hashes"
refresh_interval_secs = 30
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'cdn-director serve --config {config_path}' to start the server");
    Ok(())
}
