use clap::Parser;
use kagami::config::Config;
use kagami::error::ProxyError;
use kagami::proxy::KagamiProxy;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;

/// Kagami - Transparent origin-mirroring cache built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() {
    // Initialize logging subsystem
    kagami::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration from file
    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("{}", ProxyError::Config(e));
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("{}", ProxyError::Config(e));
        std::process::exit(1);
    }

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        origin = %config.origin.base_url,
        cache_root = %config.cache.root.display(),
        "Configuration loaded successfully"
    );

    // Build Pingora server options
    let opt = Opt {
        daemon: args.daemon,
        test: args.test,
        upgrade: args.upgrade,
        ..Default::default()
    };

    // Create Pingora server
    let mut server = Server::new(Some(opt)).expect("Failed to create Pingora server");
    server.bootstrap();

    // Create KagamiProxy instance
    let proxy = KagamiProxy::new(config.clone()).unwrap_or_else(|e| {
        eprintln!("Failed to initialize proxy: {}", e);
        std::process::exit(1);
    });

    // Create HTTP proxy service
    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);

    // Add TCP listener for HTTP
    let listen_addr = format!("{}:{}", config.server.address, config.server.port);
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(
        address = %listen_addr,
        "Starting Kagami cache"
    );

    // Register service with server
    server.add_service(proxy_service);

    // Run server forever (blocks until shutdown)
    server.run_forever();
}
