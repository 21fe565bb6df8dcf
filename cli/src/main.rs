mod commands;
mod dir_watcher;
mod state;

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use state::AppState;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let state = Arc::new(RwLock::new(AppState::new()));

    if let Some(handle) = dir_watcher::init_watcher(Arc::clone(&state)).await {
        state.write().await.dir_watcher_task = Some(handle);
    }

    loop {
        let line = readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, Arc::clone(&state)).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                write!(std::io::stdout(), "{err}").map_err(|e| e.to_string())?;
                std::io::stdout().flush().map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

fn readline() -> Result<String, String> {
    write!(std::io::stdout(), "everlog> ").map_err(|e| e.to_string())?;
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    let mut buffer = String::new();
    std::io::stdin()
        .read_line(&mut buffer)
        .map_err(|e| e.to_string())?;
    Ok(buffer)
}

#[derive(Parser)]
#[command(version, about = "EverQuest log timer engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered character logs, newest first
    Characters,
    /// Preload and tail a character's log
    Watch {
        #[arg(short, long)]
        name: String,
    },
    /// Show active timers
    Timers,
    /// Show the damage meter
    Dps,
    /// Show this session's dice rolls
    Rolls,
    /// Pick a random winner among first rolls in a range
    Pick {
        #[arg(short, long)]
        low: i64,
        #[arg(short = 'H', long)]
        high: i64,
    },
    /// Set the character level used for duration formulas
    Level {
        #[arg(short, long)]
        level: u8,
    },
    Config,
    SetDirectory {
        #[arg(short, long)]
        path: String,
    },
    Exit,
}

async fn respond(line: &str, state: Arc<RwLock<AppState>>) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "everlog".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Characters) => commands::characters(Arc::clone(&state)).await,
        Some(Commands::Watch { name }) => commands::watch(name, Arc::clone(&state)).await,
        Some(Commands::Timers) => commands::timers(Arc::clone(&state)).await,
        Some(Commands::Dps) => commands::dps(Arc::clone(&state)).await,
        Some(Commands::Rolls) => commands::rolls(Arc::clone(&state)).await,
        Some(Commands::Pick { low, high }) => commands::pick(*low, *high, Arc::clone(&state)).await,
        Some(Commands::Level { level }) => commands::level(*level, Arc::clone(&state)).await,
        Some(Commands::Config) => commands::show_settings(Arc::clone(&state)).await,
        Some(Commands::SetDirectory { path }) => {
            commands::set_directory(path, Arc::clone(&state)).await
        }
        Some(Commands::Exit) => {
            commands::exit();
            return Ok(true);
        }
        None => {}
    }
    Ok(false)
}
