//! CLI entry point for `mailblog`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mailblog::config::{self, Config};
use mailblog::imap::{Session, TlsConnector};
use mailblog::render::Renderer;
use mailblog::store::MailboxStore;
use mailblog::sync::{SyncSettings, Synchronizer};
use mailblog::web::{self, BasicAuth, Site};

/// Publish a live IMAP mailbox as a blog page and RSS feed.
#[derive(Parser)]
#[command(name = "mailblog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: $MAILBLOG_CONFIG or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// IMAP password, overriding the config file
    #[arg(long, global = true, env = "MAILBLOG_IMAP_PASSWORD", hide_env_values = true)]
    imap_password: Option<String>,

    /// Basic-auth password for the site, overriding the config file
    #[arg(long, global = true, env = "MAILBLOG_AUTH_PASSWORD", hide_env_values = true)]
    auth_password: Option<String>,

    /// Serve without connecting to the mail server
    #[arg(long, global = true)]
    no_imap: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the mailbox and serve the blog (default)
    Serve,
    /// Load and validate the configuration, then print it with secrets hidden
    CheckConfig,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        _ => {}
    }

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(password) = cli.imap_password.clone() {
        config.imap.password = password;
    }
    if let Some(password) = cli.auth_password.clone() {
        config.server.auth_password = Some(password);
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    config.validate(!cli.no_imap)?;

    match cli.command {
        Some(Commands::CheckConfig) => cmd_check_config(&config),
        _ => cmd_serve(config, cli.no_imap),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config.general.log_dir.as_ref().filter(|dir| {
        let ok = std::fs::create_dir_all(dir).is_ok();
        if !ok {
            eprintln!("Cannot create log directory {}, logging to stderr only", dir.display());
        }
        ok
    });

    if let Some(dir) = log_dir {
        let file_appender = tracing_appender::rolling::never(dir, "mailblog.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailblog", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the effective configuration with secrets hidden.
fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    // The template is only read at startup, so check it here as well.
    Renderer::from_config(config)?;

    let shown = toml::to_string_pretty(&config.redacted())?;
    println!("{shown}");
    match config::log_file_path(config) {
        Some(path) => println!("# log file: {}", path.display()),
        None => println!("# log file: none (stderr only)"),
    }
    println!("# configuration OK");
    Ok(())
}

fn cmd_serve(config: Config, no_imap: bool) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(serve(config, no_imap))
}

async fn serve(config: Config, no_imap: bool) -> anyhow::Result<()> {
    let store = Arc::new(MailboxStore::new(config.blog.capacity));
    let renderer = Renderer::from_config(&config)?;
    let auth = config
        .server
        .basic_auth()
        .map(|(user, password)| BasicAuth::new(user, password));
    if auth.is_some() {
        info!("Basic authentication enabled");
    }
    let site = Arc::new(Site::new(Arc::clone(&store), renderer, auth));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let sync_task = if no_imap {
        info!("IMAP disabled, serving an empty blog");
        None
    } else {
        let connector = TlsConnector::new(&config.imap.host, config.imap.port)?;
        let session = Session::new(connector, config.imap.command_timeout());
        let synchronizer = Synchronizer::new(session, store, SyncSettings::from_config(&config));
        Some(tokio::spawn(synchronizer.run(shutdown.clone())))
    };

    let served = web::serve(listener, site, shutdown.clone()).await;
    // The server may also stop on its own error; make sure the sync loop ends.
    shutdown.cancel();

    if let Some(task) = sync_task {
        if let Err(e) = task.await {
            error!(error = %e, "Mailbox synchronizer task failed");
        }
    }

    served.context("HTTP server failed")?;
    info!("Shutdown complete");
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => return,
    }

    info!("Shutdown signal received");
    token.cancel();
}
