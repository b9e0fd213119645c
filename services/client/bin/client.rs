//! Main Entrypoint for the Robot Teaching Client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and command line.
//! 2. Opening the session channel under a fresh session id.
//! 3. Reading operator input from stdin.
//! 4. Running the console loop until the channel closes or the operator quits.

use anyhow::Context;
use clap::Parser;
use robot_teaching_client::{
    audio::WavPlayer,
    config::Config,
    connection,
    runtime::{self, HELP, Services},
    upload::HttpUploader,
};
use robot_teaching_core::{DefinitionPipeline, Session, endpoint};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "Teach a robot new behaviour trees from the terminal")]
#[command(version)]
struct Args {
    /// Channel base URL, overriding ROBOT_TEACHING_URL (e.g. ws://robot:8000)
    #[arg(long, short = 'u')]
    url: Option<String>,

    /// Board to build definitions against, overriding BOARD
    #[arg(long, short = 'b')]
    board: Option<String>,
}

/// Forwards stdin lines until EOF.
async fn read_lines(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read operator input");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config = config.with_url(url).context("Invalid --url")?;
    }
    if let Some(board) = args.board {
        config.board = board;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Open the Channel ---
    let session_id = endpoint::SessionId::generate();
    let channel_url = endpoint::channel_url(&config.robot_teaching_url, &session_id);
    info!(%session_id, url = %channel_url, board = %config.board, "Opening teaching session...");

    let (events_tx, events) = mpsc::unbounded_channel();
    let (transport, connection) = connection::connect(channel_url, events_tx);
    let pipeline = DefinitionPipeline::default().with_board(config.board.clone());
    let mut session = Session::new(
        config.robot_teaching_url.clone(),
        session_id,
        Box::new(transport),
        pipeline,
    );

    // --- 4. Operator Input ---
    let (lines_tx, lines) = mpsc::channel(32);
    tokio::spawn(read_lines(lines_tx));
    println!("{HELP}");

    // --- 5. Run ---
    let services = Services {
        uploader: Arc::new(HttpUploader::default()),
        player: Arc::new(WavPlayer::new(
            config.audio_dir.clone(),
            config.audio_player.clone(),
        )),
    };
    let mut stdout = std::io::stdout();
    runtime::run(&mut session, events, lines, services, &mut stdout).await?;

    drop(session);
    if let Err(e) = connection.await {
        warn!(error = %e, "Connection task ended abnormally");
    }
    info!("Session closed.");
    Ok(())
}
