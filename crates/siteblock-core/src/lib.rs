pub mod clock;
pub mod config;
pub mod daemon;
pub mod daemon_control;
pub mod host;
pub mod ipc;
pub mod registry;
pub mod rules;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use daemon::Daemon;
pub use host::{AlarmService, Host, KeyValueStore, RuleEngine};
pub use registry::{BlockRegistry, RestoreReport};
