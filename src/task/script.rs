// src/task/script.rs

//! Wrapper scripts for command-based jobs.
//!
//! Every script follows the same shape so that it runs identically on a
//! worker node and on the local machine:
//!
//! ```text
//! #!/bin/bash
//! export X509_USER_PROXY=<proxy>      # only if a proxy is configured
//! unset DISPLAY
//! cd <work_dir>
//! source <setup_script> &> /dev/null  # only if a setup script is configured
//! <command> > <log> 2>&1
//! ```

use std::fmt::Write as _;
use std::path::PathBuf;

/// Where scripts and logs go, and what environment each script sets up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLayout {
    /// Directory for generated scripts (and, for Condor, submit files).
    pub submit_dir: PathBuf,
    /// Directory for per-command logs.
    pub log_dir: PathBuf,
    /// Directory the script changes into before running anything.
    pub work_dir: PathBuf,
    /// Script sourced (quietly) before the commands run.
    pub setup_script: Option<PathBuf>,
    /// Grid proxy certificate exported as `X509_USER_PROXY`.
    pub proxy: Option<String>,
}

impl ScriptLayout {
    pub fn new(submit_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            submit_dir: submit_dir.into(),
            log_dir: log_dir.into(),
            work_dir: PathBuf::from("."),
            setup_script: None,
            proxy: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_setup_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.setup_script = Some(script.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// `<submit_dir>/<job>.sh`
    pub fn script_path(&self, job: &str) -> PathBuf {
        self.submit_dir.join(format!("{job}.sh"))
    }

    /// Log file for command `index` of a job with `total` commands.
    ///
    /// Single-command jobs log to `<job>.log`; otherwise every command gets
    /// its own `<job>_cmd_<index>.log`.
    pub fn log_path(&self, job: &str, index: usize, total: usize) -> PathBuf {
        if total > 1 {
            self.log_dir.join(format!("{job}_cmd_{index}.log"))
        } else {
            self.log_dir.join(format!("{job}.log"))
        }
    }

    /// Render the full script text for `job` running `commands` in order.
    pub fn render(&self, job: &str, commands: &[String]) -> String {
        let mut out = String::from("#!/bin/bash\n");

        if let Some(proxy) = &self.proxy {
            let _ = writeln!(out, "export X509_USER_PROXY={proxy}");
        }
        out.push_str("unset DISPLAY\n");
        let _ = writeln!(out, "cd {}", self.work_dir.display());
        if let Some(setup) = &self.setup_script {
            let _ = writeln!(out, "source {} &> /dev/null", setup.display());
        }

        for (index, command) in commands.iter().enumerate() {
            let log = self.log_path(job, index, commands.len());
            let _ = writeln!(out, "{command} > {} 2>&1", log.display());
        }

        out
    }
}
