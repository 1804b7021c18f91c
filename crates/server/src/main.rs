use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::oneshot;

use flowstate_matchmaker::{Lobby, MatchmakerConfig};
use flowstate_metrics::CounterRegistry;
use flowstate_session::{GameState, SessionTable};
use flowstate_wire::IdpRegistry;

use flowstate_server::auth::{self, AuthContext};
use flowstate_server::config::ServerConfig;
use flowstate_server::game;

#[derive(Parser, Debug)]
#[command(version, about = "Flowstate auth and game session core")]
struct Cli {
    /// Directory containing ca-cert.pem and ca-key.pem.
    #[arg(long, default_value = ".")]
    cert_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let cli = Cli::parse();
    let config = Arc::new(ServerConfig::load(cli.cert_dir)?);

    let session_table = Arc::new(SessionTable::new());
    let idp_registry = Arc::new(IdpRegistry::with_defaults());
    let counters = Arc::new(CounterRegistry::new());
    let lobby_queue = Arc::new(flowstate_intrusive_list::IntrusiveList::<Lobby>::new());

    let auth_ctx = Arc::new(AuthContext {
        session_table: session_table.clone(),
        idp_registry,
        counters: counters.clone(),
        jwt_secret: config.jwt_secret,
    });

    let (auth_shutdown_tx, auth_shutdown_rx) = oneshot::channel();
    let (flush_shutdown_tx, flush_shutdown_rx) = oneshot::channel();
    let (mm_shutdown_tx, mm_shutdown_rx) = oneshot::channel();

    let auth_task = tokio::spawn(auth::run(config.clone(), auth_ctx, auth_shutdown_rx));
    let flush_task = tokio::spawn(flowstate_metrics::run_flush_loop(
        counters.clone(),
        flush_shutdown_rx,
    ));
    let mm_config = MatchmakerConfig::default();
    mm_config.validate()?;

    let mm_queue = lobby_queue.clone();
    let mm_counters = counters.clone();
    let mm_session_table = session_table.clone();
    let mm_task = tokio::spawn(flowstate_matchmaker::run(
        mm_queue,
        mm_config,
        move |m| {
            mm_counters.increment("matches_made");
            for player in &m.player_configs {
                if let Some(session) = mm_session_table.get(player.sidx) {
                    session.set_game_state(GameState::InMatch);
                }
            }
        },
        mm_shutdown_rx,
    ));

    let game_handle = game::spawn_pipeline(config.clone(), session_table, counters).await?;

    tokio::signal::ctrl_c().await.ok();
    log::info!("shutting down");

    let _ = auth_shutdown_tx.send(());
    let _ = flush_shutdown_tx.send(());
    let _ = mm_shutdown_tx.send(());
    game_handle.shutdown();

    let _ = auth_task.await;
    let _ = flush_task.await;
    let _ = mm_task.await;

    Ok(())
}
