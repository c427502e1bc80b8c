use crate::{
    clock::{Clock, SystemClock},
    config::Config,
    host::Host,
    ipc::{listen, IpcEnvelope, IpcRequest, IpcResponse},
    registry::BlockRegistry,
};
use anyhow::Result;
use siteblock_storage::Database;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Requests buffered between the socket listener and the daemon loop
const REQUEST_QUEUE: usize = 64;

/// The background controller: owns the registry and serves IPC requests
/// strictly one at a time, between alarm checks.
pub struct Daemon {
    registry: BlockRegistry,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    sock_path: PathBuf,
    shutdown_requested: bool,
}

impl Daemon {
    /// Daemon backed by the SQLite database at its default location
    #[must_use]
    pub fn new(db: Database, config: &Config, sock_path: PathBuf) -> Self {
        let host = Host::from_database(Arc::new(db));
        Self::with_host(&host, Arc::new(SystemClock::new()), config, sock_path)
    }

    #[must_use]
    pub fn with_host(
        host: &Host,
        clock: Arc<dyn Clock>,
        config: &Config,
        sock_path: PathBuf,
    ) -> Self {
        Self {
            registry: BlockRegistry::new(host, clock.clone(), config),
            clock,
            poll_interval: config.poll_interval(),
            sock_path,
            shutdown_requested: false,
        }
    }

    pub async fn run_with_signals(&mut self) -> Result<()> {
        self.registry.restore().await;

        let (tx, mut rx) = mpsc::channel::<IpcEnvelope>(REQUEST_QUEUE);
        let sock_path = self.sock_path.clone();
        tokio::spawn(async move {
            if let Err(e) = listen(tx, &sock_path).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        log::info!("Daemon started with signal handling and IPC");

        loop {
            let wake = self.wake_delay();
            tokio::select! {
                envelope = rx.recv() => {
                    let Some(IpcEnvelope { request, reply }) = envelope else {
                        log::warn!("IPC listener stopped, shutting down...");
                        break;
                    };
                    let response = self.handle(request).await;
                    if reply.send(response).is_err() {
                        log::warn!("IPC client went away before the response was sent");
                    }
                }
                () = tokio::time::sleep(wake) => {
                    let fired = self.tick().await;
                    if fired > 0 {
                        log::debug!("{fired} blocks expired");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    self.shutdown_requested = true;
                }
            }

            if self.shutdown_requested {
                break;
            }
        }

        if self.sock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.sock_path) {
                log::warn!("Failed to remove socket: {e}");
            }
        }
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }

    /// Answer one message; the single entry point for every state change
    pub async fn handle(&mut self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::BlockWebsite { website, duration } => {
                self.registry.add(&website, duration).await;
                IpcResponse::Success { success: true }
            }
            IpcRequest::UnblockWebsite { website } => {
                self.registry.remove(&website).await;
                IpcResponse::Success { success: true }
            }
            IpcRequest::GetBlockedWebsites => IpcResponse::Websites {
                websites: self.registry.list(),
            },
            IpcRequest::Status => IpcResponse::Status {
                running: true,
                blocked: self.registry.list().len(),
                next_expiry: self.registry.next_deadline(),
            },
            IpcRequest::CheckUrl { url } => {
                let rule = self.registry.check(&url).await;
                IpcResponse::Check {
                    blocked: rule.is_some(),
                    rule_id: rule.map(|rule| rule.id),
                }
            }
            IpcRequest::Shutdown => {
                self.shutdown_requested = true;
                IpcResponse::ShuttingDown {
                    shutting_down: true,
                }
            }
        }
    }

    /// Expire whatever is due now; returns how many blocks lapsed
    pub async fn tick(&mut self) -> usize {
        self.registry.fire_due().await
    }

    /// Sleep until the next expiry, but never longer than the poll interval
    fn wake_delay(&self) -> Duration {
        let Some(deadline) = self.registry.next_deadline() else {
            return self.poll_interval;
        };
        let until = deadline.saturating_sub(self.clock.now_ms());
        u64::try_from(until)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
            .min(self.poll_interval)
    }
}
