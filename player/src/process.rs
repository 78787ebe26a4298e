use anyhow::{Context, Result};
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);
const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// A spawned child that leads its own process group.
///
/// Signals go to the whole group so anything the child forks goes down with
/// it. "No such process" while signaling means the group is already gone and
/// counts as success.
pub struct GroupedChild {
    child: Child,
    pgid: Pid,
}

impl GroupedChild {
    /// Spawn with whatever stdio the caller configured; only the group
    /// leadership is imposed here.
    pub fn spawn(mut command: Command) -> Result<Self> {
        command.process_group(0);
        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn {:?}", command.get_program()))?;
        let pgid = Pid::from_raw(child.id() as i32);
        debug!("spawned {:?} as group leader {}", command.get_program(), pgid);
        Ok(Self { child, pgid })
    }

    /// Non-blocking liveness check. Also reaps the child once it exits, so a
    /// dead handle never lingers as a zombie.
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(err) => {
                warn!("failed to query child {}: {}", self.pgid, err);
                false
            }
        }
    }

    /// Graceful group terminate with a bounded wait, then a forceful kill.
    /// Never errors: a leaked process must not block session teardown.
    pub fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }

        match killpg(self.pgid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => warn!("failed to signal group {}: {}", self.pgid, err),
        }

        let deadline = Instant::now() + TERMINATE_TIMEOUT;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(TERMINATE_POLL),
                Err(_) => return,
            }
        }

        warn!("group {} ignored SIGTERM, escalating to SIGKILL", self.pgid);
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => warn!("failed to kill group {}: {}", self.pgid, err),
        }

        // One more bounded reap; if even SIGKILL failed we proceed anyway.
        let deadline = Instant::now() + TERMINATE_TIMEOUT;
        while Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(Some(_)) | Err(_) => return,
                Ok(None) => std::thread::sleep(TERMINATE_POLL),
            }
        }
    }
}

impl Drop for GroupedChild {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Handle for the external audio decoder.
///
/// The decoder has no live-seek capability, so starting mid-file means
/// passing the offset at spawn time; the session seeks by respawning.
pub struct PlayerProcess {
    inner: GroupedChild,
}

impl PlayerProcess {
    pub fn spawn(command: &str, audio_path: &Path, offset_seconds: u64) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.arg("-nodisp")
            .arg("-autoexit")
            .arg("-loglevel")
            .arg("quiet")
            .arg("-ss")
            .arg(offset_seconds.to_string())
            .arg(audio_path);
        Ok(Self {
            inner: GroupedChild::spawn(cmd)?,
        })
    }

    pub fn is_alive(&mut self) -> bool {
        self.inner.is_alive()
    }

    pub fn terminate(&mut self) {
        self.inner.terminate();
    }
}
