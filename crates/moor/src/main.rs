//! CLI for attaching local standard streams to a running container.
//!
//! The binary is glue: flag parsing, config, logging and terminal/stream
//! discovery. Everything session-shaped lives in `moor-session`.

use std::io::IsTerminal as _;
use std::sync::Arc;

use eyre::WrapErr as _;
use moor_session::{AttachConfig, SessionOutcome, SessionStreams};
use tokio_util::sync::CancellationToken;

#[derive(clap::Parser)]
#[command(
    name = "moor",
    about = "Attach local standard input, output, and error streams to a running container"
)]
struct Args {
    /// Container to attach to.
    container: String,

    /// Do not attach STDIN.
    #[arg(long)]
    no_stdin: bool,

    /// Proxy all received signals to the process.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    sig_proxy: bool,

    /// Override the key sequence for detaching a container.
    #[arg(long)]
    detach_keys: Option<String>,

    /// Enable debug logging to ~/.moor/logs
    #[arg(long)]
    debug: bool,
}

fn setup_logging(debug: bool) -> eyre::Result<()> {
    if debug {
        let log_dir = dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".moor")
            .join("logs");
        std::fs::create_dir_all(&log_dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let log_path = log_dir.join(format!("{timestamp}.log"));
        let log_file = std::fs::File::create(&log_path)?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .init();

        eprintln!("debug log: {}", log_path.display());
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

/// Without signal proxying, interrupt/terminate end the session locally.
fn cancel_on_termination(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(e) => {
                tracing::debug!("failed to install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let args = <Args as clap::Parser>::parse();
    setup_logging(args.debug)?;

    let config = moor_config::load().wrap_err("failed to load moor configuration")?;
    let keys = args.detach_keys.unwrap_or(config.detach_keys);
    let detach_keys = moor_config::parse_detach_keys(&keys)
        .wrap_err_with(|| format!("invalid detach keys '{keys}'"))?;

    let streams = SessionStreams {
        input: if args.no_stdin {
            None
        } else {
            Some(Box::new(tokio::io::stdin()))
        },
        input_is_terminal: std::io::stdin().is_terminal(),
        output: Box::new(tokio::io::stdout()),
        output_is_terminal: std::io::stdout().is_terminal(),
        error: Box::new(tokio::io::stderr()),
    };

    let cancel = CancellationToken::new();
    if !args.sig_proxy {
        cancel_on_termination(cancel.clone());
    }

    let backend = Arc::new(moor_client::Client::new());
    let session_config = AttachConfig {
        no_stdin: args.no_stdin,
        proxy: args.sig_proxy,
        detach_keys,
    };

    match moor_session::run_attach(backend, &args.container, session_config, streams, cancel)
        .await
    {
        Ok(SessionOutcome::Exited(code)) => {
            if code != 0 {
                std::process::exit(code as i32);
            }
            Ok(())
        }
        Ok(SessionOutcome::Detached) => {
            eprintln!("\n\x1b[2m[detached from {}]\x1b[0m", args.container);
            Ok(())
        }
        Ok(SessionOutcome::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
