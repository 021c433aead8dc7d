use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use sha_connect::app::App;
use sha_connect::command::{self, Command};
use sha_connect::config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sha_connect.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging. stdout belongs to the prompt, so the console layer writes to stderr.
    let log_dir = config.data_dir.join("logs");
    let log_file = std::fs::create_dir_all(&log_dir).and_then(|()| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("sha_connect.log"))
    });
    let (file_writer, _guard) = match log_file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("Log file disabled: {e}");
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                )
        }))
        .init();

    info!("🚀 Starting SHA Connect...");
    info!("Loaded config from {config_path}");

    let mut app = App::open(config);
    let caps = app.capabilities();
    info!(
        "Messaging: {}, language model: {}, translation: {}",
        caps.messaging, caps.language_model, caps.translation
    );
    if !app.outbox.is_empty() {
        warn!("{} message(s) waiting in the outbox", app.outbox.len());
    }

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let _ = stdout.write_all(b"SHA Connect. Type 'help' for commands.\n> ").await;
    let _ = stdout.flush().await;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {e}");
                break;
            }
        };

        let output = match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(cmd) => command::run(&mut app, cmd).await,
            Err(e) => e,
        };

        // Every interaction ends with all tables on disk.
        if let Err(e) = app.persist_all() {
            error!("Failed to save data: {e}");
        }

        let _ = stdout.write_all(format!("{output}\n> ").as_bytes()).await;
        let _ = stdout.flush().await;
    }

    if let Err(e) = app.persist_all() {
        error!("Failed to save data on exit: {e}");
    }
    info!("👋 SHA Connect stopped");
}
