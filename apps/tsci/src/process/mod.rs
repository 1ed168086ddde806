//! Child processes started by tsci.
//!
//! - [`daemon`] - detached `tailscaled` launch and status probe
//! - [`bounded`] - foreground commands raced against a timeout
//! - [`elevate`] - `sudo` prefixing policy

pub mod bounded;
pub mod daemon;
pub mod elevate;

use std::fmt;
use std::path::PathBuf;

pub use bounded::{Outcome, run_bounded};
pub use daemon::{StateStore, launch_daemon, probe_status};
pub use elevate::{Elevation, SudoMode};

/// Flags whose values are secrets and must never reach logs.
const SECRET_FLAGS: &[&str] = &["--authkey", "--auth-key"];

/// A program and its arguments, buildable into a std or tokio `Command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandLine {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Wraps the command in `sudo -E` when `elevation` requires it.
    #[must_use]
    pub fn elevated(self, elevation: &Elevation) -> Self {
        match elevation.sudo() {
            Some(sudo) => {
                let mut args = vec!["-E".to_string(), self.program.display().to_string()];
                args.extend(self.args);
                Self {
                    program: sudo.to_path_buf(),
                    args,
                }
            }
            None => self,
        }
    }

    #[must_use]
    pub fn to_std(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    #[must_use]
    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandLine {
    /// Renders the command for logs with secret flag values masked.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let masked = SECRET_FLAGS.iter().find_map(|flag| {
                arg.strip_prefix(flag)
                    .filter(|rest| rest.starts_with('='))
                    .map(|_| format!("{flag}=***"))
            });
            match masked {
                Some(masked) => write!(f, " {masked}")?,
                None => write!(f, " {arg}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_masks_authkey() {
        let cmd = CommandLine::new("tailscale")
            .arg("up")
            .arg("--authkey=tskey-auth-secret")
            .arg("--hostname=ci");
        assert_eq!(cmd.to_string(), "tailscale up --authkey=*** --hostname=ci");
    }

    #[test]
    fn display_keeps_similar_flags() {
        let cmd = CommandLine::new("tailscale").arg("--authkeyfile");
        assert_eq!(cmd.to_string(), "tailscale --authkeyfile");
    }

    #[test]
    fn elevated_prefixes_sudo() {
        let cmd = CommandLine::new("/opt/ts/tailscaled")
            .arg("--state=mem:")
            .elevated(&Elevation::with_sudo("/usr/bin/sudo"));
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/sudo"));
        assert_eq!(cmd.args, vec!["-E", "/opt/ts/tailscaled", "--state=mem:"]);
    }

    #[test]
    fn not_elevated_is_unchanged() {
        let cmd = CommandLine::new("tailscale").arg("status");
        assert_eq!(cmd.clone().elevated(&Elevation::none()), cmd);
    }
}
