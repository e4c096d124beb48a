//! Child processes with piped standard streams, optionally confined in a
//! cgroup (Linux only).

#[cfg(target_os = "linux")]
mod cgroup_linux;

#[cfg(target_os = "linux")]
use cgroup_linux::Container;

#[cfg(not(target_os = "linux"))]
mod cgroup_stub;

#[cfg(not(target_os = "linux"))]
use cgroup_stub::Container;

use std::{
    process::{Child, ChildStdin, ChildStdout, ExitStatus, Stdio},
    time::{Duration, Instant},
};

use anyhow::Context;
use tracing::{debug, warn};

fn create_process(command: &str, args: &[String], allow_stderr: bool) -> anyhow::Result<Child> {
    let mut cmd = std::process::Command::new(command);
    cmd.args(args).stdin(Stdio::piped()).stdout(Stdio::piped());
    if allow_stderr {
        cmd.stderr(Stdio::inherit());
    } else {
        cmd.stderr(Stdio::null());
    }
    cmd.spawn()
        .with_context(|| format!("could not launch '{command}'"))
}

/// A spawned child whose stdin/stdout are pipes owned by the parent.
///
/// The child is killed and reaped on drop if [`try_kill`](Self::try_kill)
/// did not already do it.
#[derive(Debug)]
pub struct LimitedProcess {
    child: Child,
    container: Option<Container>,
    cleaned_up: bool,
}

impl LimitedProcess {
    /// Launch `command` inside a fresh cgroup.
    ///
    /// * `max_memory` - memory limit in bytes, non-positive means none
    /// * `cpus` - cpu list such as `"0-3,6"`, empty means any cpu
    pub fn launch(
        command: &str,
        args: &[String],
        max_memory: i64,
        cpus: &str,
        allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        let container = Container::create(max_memory, cpus).context("could not create cgroup")?;
        let mut child = create_process(command, args, allow_stderr)?;
        if let Err(e) = container.add(&child) {
            let kill = child.kill();
            let _ = child.wait();
            container.delete();
            return Err(e).with_context(|| match kill {
                Ok(()) => "could not add process to cgroup".to_owned(),
                Err(err) => format!(
                    "could not add process to cgroup, and process could not be killed either ({err})"
                ),
            });
        }
        debug!(pid = child.id(), command, "process launched in cgroup");
        Ok(LimitedProcess {
            child,
            container: Some(container),
            cleaned_up: false,
        })
    }

    pub fn launch_without_container(
        command: &str,
        args: &[String],
        allow_stderr: bool,
    ) -> anyhow::Result<LimitedProcess> {
        let child = create_process(command, args, allow_stderr)?;
        debug!(pid = child.id(), command, "process launched");
        Ok(LimitedProcess {
            child,
            container: None,
            cleaned_up: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn is_contained(&self) -> bool {
        self.container.is_some()
    }

    /// Hands the parent's ends of the pipes over. Only the first call
    /// returns something.
    pub fn take_stdio(&mut self) -> Option<(ChildStdin, ChildStdout)> {
        let stdin = self.child.stdin.take()?;
        let stdout = self.child.stdout.take()?;
        Some((stdin, stdout))
    }

    /// True once the child exited (or cannot be queried anymore).
    pub fn has_exited(&mut self) -> bool {
        self.cleaned_up || self.child.try_wait().map_or(true, |status| status.is_some())
    }

    /// Polls the child until it exits or `max_duration` elapsed.
    pub fn wait_for_exit(&mut self, max_duration: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + max_duration;
        let step = Duration::from_millis(10).min(max_duration / 10);
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => std::thread::sleep(step),
                _ => return None,
            }
        }
    }

    /// Kills and reaps the child, then removes its cgroup if any.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.cleaned_up {
            return Ok(());
        }
        let pid = self.child.id();
        match &mut self.container {
            Some(container) => {
                container
                    .kill(pid as u64, max_duration)
                    .context("could not kill process")?;
            }
            None => {
                if !matches!(self.child.try_wait(), Ok(Some(_))) {
                    self.child.kill().context("could not kill process")?;
                }
            }
        }
        // reap, the process is dead at this point
        let _ = self.child.wait();
        self.cleaned_up = true;
        if let Some(container) = self.container.take() {
            container.delete();
        }
        debug!(pid, "process cleaned up");
        Ok(())
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_millis(100);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                warn!(pid = self.child.id(), "could not clean up process on drop: {e:#}");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{BufRead, BufReader, Write};

    use super::*;

    #[test]
    fn pipes_reach_the_child() {
        let mut process = LimitedProcess::launch_without_container("cat", &[], false).unwrap();
        let (mut stdin, stdout) = process.take_stdio().unwrap();
        assert!(process.take_stdio().is_none());

        stdin.write_all(b"{\"ping\":1}\n").unwrap();
        stdin.flush().unwrap();
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"ping\":1}\n");

        drop(stdin);
        assert!(process.wait_for_exit(Duration::from_secs(2)).is_some());
        assert!(process.has_exited());
        process.try_kill(Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn kill_stops_a_running_child() {
        let args = vec!["5".to_owned()];
        let mut process = LimitedProcess::launch_without_container("sleep", &args, false).unwrap();
        assert!(!process.has_exited());
        process.try_kill(Duration::from_millis(100)).unwrap();
        assert!(process.has_exited());
        // second call is a no-op
        process.try_kill(Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(LimitedProcess::launch_without_container("./no-such-bot", &[], false).is_err());
    }
}
