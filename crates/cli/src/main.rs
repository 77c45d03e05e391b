//! storyline command-line entry point.
//!
//! Drives the offline core from a terminal: pre-cache and activate the shell,
//! fetch through the cache router, queue and replay story uploads, manage
//! favorites and the push subscription. Logging goes to stderr so stdout
//! stays clean for command output.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "storyline")]
#[command(about = "Offline cache, write queue and favorites for the story client")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pre-cache the shell manifest into the current static generation
    Install,

    /// Delete stale cache generations
    Activate,

    /// Fetch a URL through the cache router
    Fetch {
        url: String,

        /// Print the response body to stdout
        #[arg(long)]
        body: bool,
    },

    /// List stories from the API (served through the cache router)
    Stories {
        /// Only stories with a location
        #[arg(long)]
        location: bool,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        size: Option<u32>,
    },

    /// Upload a story, queueing it when offline or when the upload fails
    Submit(commands::sync::SubmitArgs),

    /// Replay queued uploads once
    Sync,

    /// Run the replay loop until interrupted
    Run,

    /// Manage favorites
    #[command(subcommand)]
    Favorites(commands::favorites::FavoritesCommand),

    /// Inspect the upload queue
    #[command(subcommand)]
    Pending(commands::pending::PendingCommand),

    /// Manage the push subscription
    #[command(subcommand)]
    Push(commands::push::PushCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    let ctx = commands::Context::load().await?;

    match args.command {
        Command::Install => commands::agent::install(&ctx).await,
        Command::Activate => commands::agent::activate(&ctx).await,
        Command::Fetch { url, body } => commands::agent::fetch(&ctx, &url, body).await,
        Command::Stories { location, page, size } => commands::agent::stories(&ctx, location, page, size).await,
        Command::Submit(submit) => commands::sync::submit(&ctx, submit).await,
        Command::Sync => commands::sync::sweep(&ctx).await,
        Command::Run => commands::sync::run(&ctx).await,
        Command::Favorites(cmd) => commands::favorites::handle(&ctx, cmd).await,
        Command::Pending(cmd) => commands::pending::handle(&ctx, cmd).await,
        Command::Push(cmd) => commands::push::handle(&ctx, cmd).await,
    }
}
