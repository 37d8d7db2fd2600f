//! stderr + log file sink shared by the orchestrator and every worker.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

/// Cloneable handle; all clones append to the same file.
#[derive(Clone, Default)]
pub struct Logger {
    file: Option<Arc<Mutex<BufWriter<File>>>>,
    verbose: bool,
}

impl Logger {
    /// stderr only (tests, probes)
    pub fn stderr() -> Self {
        Self::default()
    }

    /// `<dir>/posecast_YYYYmmdd_HHMMSS.log` を作成
    pub fn open<P: AsRef<Path>>(dir: P, verbose: bool) -> Result<(Self, String)> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log dir {}", dir.display()))?;
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("posecast_{}.log", ts));
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let path = path.display().to_string();
        eprintln!("Log: {}", path);
        Ok((
            Self {
                file: Some(Arc::new(Mutex::new(BufWriter::new(file)))),
                verbose,
            },
            path,
        ))
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn write_line(&self, msg: &str) {
        eprintln!("{}", msg);
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{}", msg);
                let _ = f.flush();
            }
        }
    }
}

#[macro_export]
macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        $logger.write_line(&format!($($arg)*));
    }};
}

/// Only emitted when `log.verbose` is set.
#[macro_export]
macro_rules! vlog {
    ($logger:expr, $($arg:tt)*) => {{
        if $logger.verbose() {
            $logger.write_line(&format!($($arg)*));
        }
    }};
}
