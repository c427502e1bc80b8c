//! Daemon lifecycle management commands

use anyhow::{Context, Result};
use siteblock_core::{
    config::{Config, DataPaths},
    daemon_control::DaemonControl,
    ipc::{IpcClient, IpcRequest, IpcResponse},
    Daemon,
};
use siteblock_storage::Database;
use std::{env, fs, process::Command, time::Duration};
use sysinfo::{Pid, System};

use super::helpers::format_countdown;

fn process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

pub fn start_daemon(paths: &DataPaths) -> Result<()> {
    let control = DaemonControl::new(&paths.pid_file);

    // 1. Check if daemon is already running
    match control.get_pid() {
        Ok(Some(pid)) if process_alive(pid) => {
            log::info!("Daemon is already running (PID: {pid}).");
            return Ok(());
        }
        Ok(None) => {}
        _ => {
            log::warn!("Removing stale PID file.");
            control.remove_pid()?;
        }
    }

    // 2. Clean up old socket if it exists
    if paths.socket.exists() {
        log::warn!("Removing stale socket file.");
        fs::remove_file(&paths.socket)?;
    }

    log::info!("Starting siteblock daemon...");

    // 3. Spawn a new process for the daemon
    let current_exe = env::current_exe()?;
    let current_dir = env::current_dir()?;
    let child = Command::new(current_exe)
        .arg("daemon-internal-start")
        .current_dir(current_dir)
        .spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    control.write_pid(child.id())?;

    Ok(())
}

pub async fn run_daemon_process(paths: &DataPaths) -> Result<()> {
    // This is the detached daemon process
    // We must set up logging here, as this is a new process.
    if let Err(e) = setup_daemon_logging(paths) {
        // If logging fails, we have no way to report errors. Panicking is the only option.
        panic!("Failed to set up daemon logging: {e}");
    }
    log::info!("Daemon process started internally.");

    if let Err(e) = daemon_main_logic(paths).await {
        log::error!("Daemon main logic exited with a fatal error: {e:#}");
        return Err(e);
    }

    Ok(())
}

async fn daemon_main_logic(paths: &DataPaths) -> Result<()> {
    let config = Config::load(&paths.config_file)?;
    let db = Database::new(Some(paths.database.clone()))?;
    let mut daemon = Daemon::new(db, &config, paths.socket.clone());
    daemon.run_with_signals().await
}

pub async fn stop_daemon(paths: &DataPaths) -> Result<()> {
    let control = DaemonControl::new(&paths.pid_file);

    let Some(pid) = control.get_pid()? else {
        log::info!("Daemon is not running (no PID file).");
        // Also remove socket if it exists for consistency
        if paths.socket.exists() {
            fs::remove_file(&paths.socket)?;
        }
        return Ok(());
    };

    log::info!("Stopping siteblock daemon (PID: {pid})...");
    let client = IpcClient::new(&paths.socket);

    match client.send_command(&IpcRequest::Shutdown).await {
        Ok(IpcResponse::ShuttingDown { .. }) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            tokio::time::sleep(Duration::from_secs(2)).await;

            if process_alive(pid) {
                log::warn!("Daemon did not stop gracefully. Force killing...");
                kill(pid);
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Ok(resp) => log::error!("Received unexpected response from daemon: {resp:?}"),
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Forcing cleanup.");
            if process_alive(pid) {
                kill(pid);
                log::info!("Process killed.");
            }
        }
    }

    // Cleanup
    control.remove_pid()?;
    if paths.socket.exists() {
        fs::remove_file(&paths.socket)?;
    }

    Ok(())
}

fn kill(pid: u32) {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if sys.refresh_process(pid) {
        if let Some(process) = sys.process(pid) {
            process.kill();
        }
    }
}

pub async fn show_status(paths: &DataPaths) -> Result<()> {
    if !paths.socket.exists() {
        println!("Daemon Status: Not running");
        return Ok(());
    }

    let client = IpcClient::new(&paths.socket);
    match client.send_command(&IpcRequest::Status).await {
        Ok(IpcResponse::Status {
            running,
            blocked,
            next_expiry,
        }) => {
            println!(
                "Daemon Status: {}",
                if running { "Running" } else { "Stopped" }
            );
            println!("Blocked websites: {blocked}");
            if let Some(at) = next_expiry {
                let left = at - chrono::Utc::now().timestamp_millis();
                println!("Next unblock in: {}", format_countdown(left));
            }
        }
        Ok(_) => anyhow::bail!("Unexpected response from daemon"),
        Err(e) => {
            log::error!("Failed to get status: {e}");
            println!("Daemon Status: Not running (or not responding)");
        }
    }
    Ok(())
}

fn setup_daemon_logging(paths: &DataPaths) -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    if let Some(parent) = paths.log_file.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_file)
        .context("Failed to open daemon log file")?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}
