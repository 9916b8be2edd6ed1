//! Process-group helpers for reliable child cleanup.
//!
//! Every command spawned by this crate becomes the leader of its own session
//! and process group, so a timeout or cancellation can take down the whole
//! tree (children, grandchildren, backgrounded jobs) rather than a single
//! PID:
//! - `detach_from_tty` runs in `pre_exec` and calls `setsid`, falling back to
//!   `setpgid` when the child is already a session leader.
//! - `set_parent_death_signal` (Linux only) delivers `SIGTERM` to the child if
//!   the gate process dies first.
//! - `signal_process_group` / `kill_process_group` target a known group id.
//! - [`ProcessGroupGuard`] kills the group when dropped unless disarmed, which
//!   keeps cleanup on the path even when the awaiting future is cancelled.
//!
//! On non-Unix platforms the group helpers are no-ops; callers fall back to
//! killing the direct child.

use std::io;

/// Default grace period between `SIGTERM` and `SIGKILL` (milliseconds).
pub const DEFAULT_GRACEFUL_TIMEOUT_MS: u64 = 500;

/// Signal to deliver to a process group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM - allows graceful shutdown
    Term,
    /// SIGKILL - immediate termination
    #[default]
    Kill,
}

#[cfg(unix)]
impl KillSignal {
    fn as_nix_signal(self) -> nix::sys::signal::Signal {
        match self {
            KillSignal::Term => nix::sys::signal::Signal::SIGTERM,
            KillSignal::Kill => nix::sys::signal::Signal::SIGKILL,
        }
    }
}

/// Arrange for the child to receive `SIGTERM` when the spawning process dies.
///
/// Must run inside `pre_exec`. `parent_pid` is captured before the fork so a
/// parent that exits between fork and exec is still detected.
#[cfg(target_os = "linux")]
pub fn set_parent_death_signal(parent_pid: libc::pid_t) -> io::Result<()> {
    if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::getppid() } != parent_pid {
        unsafe {
            libc::raise(libc::SIGTERM);
        }
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_parent_death_signal(_parent_pid: i32) -> io::Result<()> {
    Ok(())
}

/// Start a new session so the child leads its own process group and has no
/// controlling terminal.
#[cfg(unix)]
pub fn detach_from_tty() -> io::Result<()> {
    if unsafe { libc::setsid() } == -1 {
        let err = io::Error::last_os_error();
        // EPERM: already a session leader, a fresh group is still enough.
        if err.raw_os_error() == Some(libc::EPERM) {
            return set_process_group();
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn detach_from_tty() -> io::Result<()> {
    Ok(())
}

/// Put the calling process into its own process group.
#[cfg(unix)]
pub fn set_process_group() -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
pub fn set_process_group() -> io::Result<()> {
    Ok(())
}

/// Deliver `signal` to every member of `process_group_id`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(process_group_id: u32, signal: KillSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(process_group_id) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("process group id {process_group_id} out of range"),
        ));
    };

    match nix::sys::signal::killpg(Pid::from_raw(raw), signal.as_nix_signal()) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
pub fn signal_process_group(_process_group_id: u32, _signal: KillSignal) -> io::Result<()> {
    Ok(())
}

/// Send `SIGKILL` to the whole group (best-effort).
pub fn kill_process_group(process_group_id: u32) -> io::Result<()> {
    signal_process_group(process_group_id, KillSignal::Kill)
}

/// True while at least one process (zombies included) remains in the group.
#[cfg(unix)]
pub fn process_group_is_alive(process_group_id: u32) -> bool {
    let Ok(raw) = i32::try_from(process_group_id) else {
        return false;
    };
    match nix::sys::signal::killpg(nix::unistd::Pid::from_raw(raw), None) {
        Ok(()) => true,
        // EPERM means the group exists but belongs to someone else.
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_group_is_alive(_process_group_id: u32) -> bool {
    false
}

/// Kills a process group on drop unless [`ProcessGroupGuard::disarm`] was
/// called after an orderly shutdown.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    process_group_id: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(process_group_id: u32) -> Self {
        Self {
            process_group_id: Some(process_group_id),
        }
    }

    pub fn process_group_id(&self) -> Option<u32> {
        self.process_group_id
    }

    /// The group has been reaped; nothing left to clean up.
    pub fn disarm(&mut self) {
        self.process_group_id = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.process_group_id.take()
            && let Err(err) = kill_process_group(pgid)
        {
            tracing::warn!(pgid, error = %err, "failed to kill process group during cleanup");
        }
    }
}
