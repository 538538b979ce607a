use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "revloop")]
#[command(version, about = "Automated PR review-and-fix loop")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a review session for a pull request
    Start {
        /// Pull request number
        #[arg(short, long)]
        pr: u64,

        /// Reviewers to wait on (defaults to the configured set)
        #[arg(short, long)]
        bot: Vec<String>,

        /// Override the round ceiling
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Reconcile at a round boundary; exits 0 to proceed, 1 when blocked
    Check,
    /// Print the current session phase
    Status,
    /// Cancel the active session
    Cancel,
    /// Print the progress ledger of the latest session
    Ledger,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    let exit_code = match &cli.command {
        Commands::Start {
            pr,
            bot,
            max_rounds,
        } => {
            cmd::cmd_start(&project_dir, *pr, bot.clone(), *max_rounds).await?;
            0
        }
        Commands::Check => cmd::cmd_check(&project_dir).await?,
        Commands::Status => {
            cmd::cmd_status(&project_dir)?;
            0
        }
        Commands::Cancel => {
            cmd::cmd_cancel(&project_dir)?;
            0
        }
        Commands::Ledger => {
            cmd::cmd_ledger(&project_dir)?;
            0
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "revloop=debug" } else { "revloop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
