//! FitHero command-line entry point.

use clap::{Parser, Subcommand};
use fithero_client::{logging, render, ClientConfig, ClientResult, RestClient};
use fithero_core::{AchievementId, DailyTaskId};
use fithero_sync::{MutationHandle, MutationResult, Session, ViewState};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

/// FitHero command line arguments.
#[derive(Parser, Debug)]
#[command(name = "fithero", version)]
#[command(about = "Level up your fitness from the terminal")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, value_name = "PATH", env = "FITHERO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show level, points and titles
    Status,
    /// List today's tasks
    Tasks,
    /// Complete one of today's tasks
    Complete {
        /// Daily task id
        id: u64,
    },
    /// Spend points on an achievement
    Unlock {
        /// Achievement id
        id: u64,
    },
    /// Generate a fresh set of daily tasks
    Generate,
    /// List the achievement catalog
    Achievements,
    /// Show the top users by points
    Leaderboard,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<ExitCode> {
    let config = ClientConfig::load(cli.config.as_deref())?;
    logging::init(&config.log, cli.verbose)?;

    let api = RestClient::new(&config)?;
    info!(base_url = api.base_url(), "Connecting to FitHero");
    let session = Session::connect(Arc::new(api), config.sync_config()).await?;

    let code = match cli.command {
        Command::Status => {
            let profile = session.profile().await;
            show(&profile, "profile", |profile| {
                render::status(profile, &profile.level_progress())
            })
        }
        Command::Tasks => show(&session.daily_tasks().await, "daily tasks", |tasks| {
            render::tasks(tasks)
        }),
        Command::Complete { id } => {
            session.daily_tasks().await;
            settle(&session, session.complete_task(DailyTaskId::from(id))).await
        }
        Command::Unlock { id } => {
            session.achievements().await;
            session.unlocked_achievements().await;
            settle(&session, session.unlock_achievement(AchievementId::from(id))).await
        }
        Command::Generate => settle(&session, session.generate_tasks()).await,
        Command::Achievements => {
            let catalog = session.achievements().await;
            let unlocked = session.unlocked_achievements().await;
            let points = session
                .profile()
                .await
                .data
                .map(|profile| profile.points)
                .unwrap_or(0);
            let unlocked = unlocked.data.unwrap_or_default();
            show(&catalog, "achievements", |catalog| {
                render::achievements(catalog, &unlocked, points)
            })
        }
        Command::Leaderboard => {
            let me = session.user();
            show(&session.leaderboard().await, "leaderboard", |rows| {
                render::leaderboard(rows, me)
            })
        }
    };
    Ok(code)
}

fn show<T>(state: &ViewState<T>, view: &str, format: impl FnOnce(&T) -> String) -> ExitCode {
    match render::view_or_reason(state, view) {
        Ok(data) => {
            print!("{}", format(data));
            ExitCode::SUCCESS
        }
        Err(reason) => {
            eprintln!("{}", reason);
            ExitCode::FAILURE
        }
    }
}

/// Wait for a mutation to settle and print the notification it produced.
async fn settle<T>(session: &Session, started: MutationResult<MutationHandle<T>>) -> ExitCode {
    let outcome = match started {
        Ok(handle) => handle.settled().await.map(|_| ()),
        Err(err) => Err(err),
    };
    if let Some(notification) = session.notifications().current() {
        println!("{}", render::notification(&notification));
    }
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
