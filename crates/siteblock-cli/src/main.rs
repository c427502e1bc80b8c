mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use siteblock_core::{
    config::{get_data_dir, DataPaths},
    ipc::IpcClient,
};

use commands::{
    block::{block_command, check_command, unblock_command},
    daemon::{run_daemon_process, show_status, start_daemon, stop_daemon},
    list::{show_list, watch_list},
};

#[derive(Parser)]
#[command(name = "siteblock")]
#[command(about = "Temporarily block websites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the blocking daemon
    Start,
    /// (Internal) Run the daemon process
    #[command(hide = true)]
    DaemonInternalStart,
    /// Stop the blocking daemon
    Stop,
    /// Check daemon status
    Status,
    /// Block a website for a while
    Block {
        /// Website or URL pattern to block
        site: String,
        /// Hours to block for
        #[arg(long, default_value = "")]
        hours: String,
        /// Minutes to block for
        #[arg(short, long, default_value = "")]
        minutes: String,
    },
    /// Lift the block on a website
    Unblock {
        /// Website exactly as it was blocked
        site: String,
    },
    /// Show blocked websites and the time left on each
    List {
        /// Keep the list on screen and refresh it every second
        #[arg(short, long)]
        watch: bool,
    },
    /// Ask whether visiting a URL would be blocked
    Check {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::DaemonInternalStart) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;
    let paths = DataPaths::new(&data_dir);
    let client = IpcClient::new(&paths.socket);

    match cli.command {
        Commands::Start => start_daemon(&paths),
        Commands::DaemonInternalStart => run_daemon_process(&paths).await,
        Commands::Stop => stop_daemon(&paths).await,
        Commands::Status => show_status(&paths).await,
        Commands::Block {
            site,
            hours,
            minutes,
        } => block_command(&client, &site, &hours, &minutes).await,
        Commands::Unblock { site } => unblock_command(&client, &site).await,
        Commands::List { watch } => {
            if watch {
                watch_list(&client).await
            } else {
                show_list(&client).await
            }
        }
        Commands::Check { url } => check_command(&client, &url).await,
    }
}
