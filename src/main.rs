use std::{
    future::IntoFuture,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::middleware::from_fn;
use clap::Parser;
use color_eyre::{
    Result,
    eyre::Context,
};
use fieldroute::{
    BoxError, Closer, Fields, Fixed, Input, Outcome, Remainder, RequestContext, Router,
    config::{ServerConfig, ServerConfigValidator, loader},
    metrics, tracing_setup,
    utils::GracefulShutdown,
};
use http::{HeaderValue, header};
use serde::{Deserialize, Serialize};
use tower_http::set_header::SetResponseHeaderLayer;

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
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Write a configuration file with the default settings
    Init {
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Serve the demo router (default)
    Serve {
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve_command(&config).await,
        None => serve_command(&args.config).await,
    }
}

async fn serve_command(config_path: &str) -> Result<()> {
    let config = if Path::new(config_path).exists() {
        loader::load_config(config_path).await?
    } else {
        ServerConfig::default()
    };
    ServerConfigValidator::validate(&config)
        .wrap_err_with(|| format!("Invalid configuration in {config_path}"))?;

    tracing_setup::init_tracing_with_config(&config.logging)?;
    metrics::init_metrics();
    if !Path::new(config_path).exists() {
        tracing::warn!("Configuration file {} not found, using defaults", config_path);
    }

    let router = demo_router(config.router.body_limit_bytes)
        .wrap_err("Failed to assemble the demo router")?;
    let app = axum::Router::new().fallback_service(router);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", config.listen_addr))?;
    tracing::info!("Listening on {}", config.listen_addr);

    let shutdown = GracefulShutdown::with_timeout(Duration::from_secs(config.shutdown_timeout_secs));
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { shutdown.run_signal_handler().await }
    });

    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown.wait_for_shutdown().await;
            }
        })
        .into_future();
    let drain_deadline = async {
        shutdown.wait_for_shutdown().await;
        tokio::time::sleep(shutdown.drain_timeout()).await;
    };

    tokio::select! {
        result = server => result.wrap_err("Server error")?,
        _ = drain_deadline => {
            tracing::warn!(
                "In-flight requests did not drain within {:?}, exiting",
                shutdown.drain_timeout()
            );
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

#[derive(Default)]
struct Hello {
    foo: Fixed,
}

impl Input for Hello {
    fn fields() -> Fields<Self> {
        Fields::new().field("foo", |h: &mut Self| &mut h.foo)
    }
}

#[derive(Default)]
struct Times {
    int_id: i64,
    stuff: Fixed,
    string_id: String,
}

impl Input for Times {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("int_id", |t: &mut Self| &mut t.int_id)
            .field("stuff", |t: &mut Self| &mut t.stuff)
            .field("string_id", |t: &mut Self| &mut t.string_id)
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Greeting {
    #[serde(rename = "Greetings")]
    greetings: String,
}

#[derive(Default)]
struct Echo {
    echo: Fixed,
    body: Greeting,
}

impl Input for Echo {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("echo", |e: &mut Self| &mut e.echo)
            .field("body", |e: &mut Self| &mut e.body)
    }
}

#[derive(Default)]
struct Files {
    files: Fixed,
    rest: Remainder,
}

impl Input for Files {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("files", |f: &mut Self| &mut f.files)
            .field("rest", |f: &mut Self| &mut f.rest)
    }
}

#[derive(Default)]
struct Search {
    search: Fixed,
    q: String,
    page: Option<u32>,
    tag: Vec<String>,
}

impl Input for Search {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("search", |s: &mut Self| &mut s.search)
            .field("q", |s: &mut Self| &mut s.q)
            .field("page", |s: &mut Self| &mut s.page)
            .field("tag", |s: &mut Self| &mut s.tag)
    }
}

#[derive(Default)]
struct Visits {
    visits: Fixed,
    count: u64,
}

impl Input for Visits {
    fn fields() -> Fields<Self> {
        Fields::new()
            .field("visits", |v: &mut Self| &mut v.visits)
            .field("count", |v: &mut Self| &mut v.count)
    }
}

#[derive(Serialize)]
struct SearchResult {
    query: String,
    page: u32,
    tags: Vec<String>,
}

/// Routes served by `fieldroute serve`.
fn demo_router(body_limit: usize) -> std::result::Result<Router, fieldroute::RegistrationError> {
    let visits = Arc::new(AtomicU64::new(0));

    Router::builder()
        .body_limit(body_limit)
        .middleware(from_fn(fieldroute::adapters::request_id_middleware))
        .middleware(from_fn(fieldroute::adapters::request_timing_middleware))
        .middleware(SetResponseHeaderLayer::if_not_present(
            header::SERVER,
            HeaderValue::from_static(concat!("fieldroute/", env!("CARGO_PKG_VERSION"))),
        ))
        .path_by_name_of_fixed_typed(|name| name.to_lowercase())
        .by_type([fieldroute::int_path_ids()])
        .by_type([fieldroute::string_path_ids()])
        .by_type([fieldroute::path_remainder()])
        .by_name("body", [fieldroute::json_body::<Greeting>()])
        .by_name("q", [fieldroute::query_value::<String>("q")])
        .by_name("page", [fieldroute::optional_query_value::<u32>("page")])
        .by_name("tag", [fieldroute::query_values::<String>("tag")])
        .by_name(
            "count",
            [fieldroute::closable_request_value(
                move |_: &RequestContext, count: &mut u64| {
                    *count = visits.load(Ordering::Relaxed);
                    let visits = Arc::clone(&visits);
                    let closer: Closer = Box::new(move |outcome: Outcome<'_>| {
                        if outcome.is_none() {
                            visits.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(())
                    });
                    Ok(closer)
                },
            )],
        )
        .get(|_: Hello| async { Ok::<_, BoxError>("Hello World") })
        .get(|t: Times| async move {
            Ok::<_, BoxError>(format!("{} times Hello {}", t.int_id, t.string_id))
        })
        .post(|e: Echo| async move { Ok::<_, BoxError>(e.body.greetings) })
        .get(|f: Files| async move { Ok::<_, BoxError>(f.rest.joined()) })
        .get(|s: Search| async move {
            Ok::<_, BoxError>(SearchResult {
                query: s.q,
                page: s.page.unwrap_or(1),
                tags: s.tag,
            })
        })
        .get(|v: Visits| async move { Ok::<_, BoxError>(v.count) })
        .build()
}

async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match loader::load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:?}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Body Limit: {} bytes", config.router.body_limit_bytes);
            println!("   • Log Level: {}", config.logging.level);
            println!("   • Shutdown Timeout: {}s", config.shutdown_timeout_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, loader::render_default_config())
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'fieldroute serve --config {config_path}' to start the server");
    Ok(())
}
