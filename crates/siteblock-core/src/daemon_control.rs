use std::io::Read;
use std::path::{Path, PathBuf};

/// PID file bookkeeping for the detached daemon process
pub struct DaemonControl {
    pid_file: PathBuf,
}

impl DaemonControl {
    /// Create a daemon control instance for `pid_file`
    #[must_use]
    pub fn new(pid_file: &Path) -> Self {
        Self {
            pid_file: pid_file.to_path_buf(),
        }
    }

    /// Read PID from file
    fn read_pid(&self) -> anyhow::Result<u32> {
        let mut file = std::fs::File::open(&self.pid_file)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        contents.trim().parse::<u32>().map_err(Into::into)
    }

    /// Get PID of running daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the PID file exists but cannot be read or parsed
    pub fn get_pid(&self) -> anyhow::Result<Option<u32>> {
        if !self.pid_file.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_pid()?))
    }

    /// Record the PID of a freshly spawned daemon
    ///
    /// # Errors
    ///
    /// Returns an error if the PID file cannot be written
    pub fn write_pid(&self, pid: u32) -> anyhow::Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.pid_file, pid.to_string())?;
        Ok(())
    }

    /// Remove PID file
    ///
    /// # Errors
    ///
    /// Returns an error if the PID file exists but cannot be removed
    pub fn remove_pid(&self) -> anyhow::Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)?;
        }
        Ok(())
    }
}
