use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use agentboard::board::bootstrap::ensure_workflow_columns;
use agentboard::board::meta;
use agentboard::board::store::{BoardStore, FileBoardStore};
use agentboard::board::HttpBoardStore;
use agentboard::config::Config;
use agentboard::export::write_backup;
use agentboard::runner::registry::RegistryHandle;
use agentboard::runner::{RunnerState, TaskRunner};
use agentboard::server::{self, AppState};
use agentboard::specgen::SpecGenerator;
use agentboard::specgen::provider::FallbackChain;

#[derive(Parser)]
#[command(name = "agentboard")]
#[command(version, about = "Multi-agent task orchestrator on a Kanban board")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run both control loops and the local control server (default)
    Serve {
        /// Control server port (overrides CONTROL_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the loaded agent registry
    Agents,
    /// Write a backup file to exports/ and print its path
    Export,
    /// Print a column/task summary of the current board
    Board,
}

fn make_store(config: &Config) -> Arc<dyn BoardStore> {
    match config.board_url {
        Some(ref url) => {
            eprintln!("[main] Using remote board store at {}", url);
            Arc::new(HttpBoardStore::new(url, config.board_token.clone()))
        }
        None => {
            let path = config.board_file();
            eprintln!("[main] Using local board store at {}", path.display());
            Arc::new(FileBoardStore::new(path))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.control_port = port;
            }
            serve(Arc::new(config)).await
        }
        Commands::Agents => {
            let registry = RegistryHandle::open(config.agents_file.clone());
            let registry = registry.current();
            println!(
                "{:<12} {:<12} {:>6}  {:<7} {:<7} KEYWORDS",
                "ID", "CMD", "RAM", "DEFAULT", "ENABLED"
            );
            for agent in registry.all() {
                println!(
                    "{:<12} {:<12} {:>6}  {:<7} {:<7} {}",
                    agent.id,
                    agent.cmd,
                    agent.ram_mb,
                    agent.default,
                    agent.enabled,
                    agent.keywords.join(", ")
                );
            }
            Ok(())
        }
        Commands::Export => {
            let store = make_store(&config);
            let summary = write_backup(&config, store.as_ref(), 0, 0).await?;
            println!(
                "Backup written to {} ({} tasks, {} archived results)",
                summary.path.display(),
                summary.tasks,
                summary.results
            );
            Ok(())
        }
        Commands::Board => {
            let store = make_store(&config);
            let board = store.get_board().await.context("Board fetch failed")?;
            if board.columns.is_empty() {
                println!("Board is empty.");
            }
            for column in &board.columns {
                println!("{} ({} tasks)", column.title, column.tasks.len());
                for task in &column.tasks {
                    let status = meta::parse(&task.description)
                        .map(|m| m.status.as_str())
                        .unwrap_or("-");
                    println!("  [{}] {}", status, task.title);
                }
            }
            if !board.backlog.is_empty() {
                println!("Backlog: {} project(s)", board.backlog.len());
            }
            Ok(())
        }
    }
}

async fn serve(config: Arc<Config>) -> Result<()> {
    let store = make_store(&config);
    let registry = RegistryHandle::open(config.agents_file.clone());
    let state = RunnerState::new();

    // Bootstrap failures are not fatal: the runner retries the same code
    // path on every poll tick.
    match ensure_workflow_columns(store.as_ref()).await {
        Ok(columns) => {
            if let Ok(mut cached) = state.columns.lock() {
                *cached = Some(columns);
            }
        }
        Err(e) => eprintln!("[main] Column bootstrap failed ({}), retrying on poll", e),
    }

    let chain = FallbackChain::from_config(&config);
    if chain.is_configured() {
        let generator = SpecGenerator::new(Arc::clone(&store), chain, config.debug_dir());
        tokio::spawn(generator.run());
    } else {
        eprintln!("[specgen] No LLM provider configured, spec generation disabled");
    }

    let runner = TaskRunner::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::clone(&config),
        Arc::clone(&state),
    );
    tokio::spawn(runner.run());

    let app_state = Arc::new(AppState {
        config: Arc::clone(&config),
        store,
        registry: Arc::clone(&registry),
        runner: Arc::clone(&state),
    });
    tokio::spawn(async move {
        if let Err(e) = server::start_server(app_state).await {
            eprintln!("[server] {:#}", e);
        }
    });

    wait_for_shutdown(&registry).await?;

    eprintln!("[main] Shutting down, terminating active agents");
    state.signal_all_children();
    let grace_deadline = std::time::Instant::now() + Duration::from_secs(5);
    while state.active.lock().map(|a| !a.is_empty()).unwrap_or(false) {
        if std::time::Instant::now() >= grace_deadline {
            eprintln!("[main] Grace period elapsed, exiting with agents still active");
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(())
}

/// Block until SIGTERM/SIGINT; SIGHUP reloads the agent registry in place.
async fn wait_for_shutdown(registry: &Arc<RegistryHandle>) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(()),
                _ = terminate.recv() => return Ok(()),
                _ = hangup.recv() => {
                    eprintln!("[main] SIGHUP received, reloading agent registry");
                    registry.reload();
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = registry;
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for ctrl-c")?;
        Ok(())
    }
}
