use std::fmt;

/// A raw wait status exactly as `waitpid` reported it.
///
/// The job table stores these untouched; everything else reads them through
/// [`WaitStatus::decode`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WaitStatus {
    raw: libc::c_int,
}

/// The decoded meaning of a single state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i32),
    Signaled(i32),
    Stopped(i32),
    /// Only reported when continue notifications are requested; the waiters
    /// never ask for them.
    Continued,
}

/// What a single `waitpid` call on a process group yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// A member of the group changed state.
    Changed { pid: libc::pid_t, status: WaitStatus },
    /// Non-blocking wait: members exist but none changed state.
    NotReady,
    /// ECHILD: the group has no unwaited-for members left.
    NoMoreChildren,
}

impl WaitStatus {
    pub const fn from_raw(raw: libc::c_int) -> Self {
        Self { raw }
    }

    pub fn decode(self) -> WaitOutcome {
        let raw = self.raw;
        if libc::WIFEXITED(raw) {
            WaitOutcome::Exited(libc::WEXITSTATUS(raw))
        } else if libc::WIFSIGNALED(raw) {
            WaitOutcome::Signaled(libc::WTERMSIG(raw))
        } else if libc::WIFSTOPPED(raw) {
            WaitOutcome::Stopped(libc::WSTOPSIG(raw))
        } else {
            WaitOutcome::Continued
        }
    }

    #[cfg(test)]
    pub(crate) const fn exited(code: i32) -> Self {
        Self::from_raw((code & 0xff) << 8)
    }

    #[cfg(test)]
    pub(crate) const fn signaled(signal: i32) -> Self {
        Self::from_raw(signal & 0x7f)
    }

    #[cfg(test)]
    pub(crate) const fn stopped(signal: i32) -> Self {
        Self::from_raw(((signal & 0xff) << 8) | 0x7f)
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            WaitOutcome::Exited(code) => write!(f, "ExitStatus({code})"),
            WaitOutcome::Signaled(signal) => write!(f, "TermSignal({signal})"),
            WaitOutcome::Stopped(signal) => write!(f, "StopSignal({signal})"),
            WaitOutcome::Continued => write!(f, "Continued"),
        }
    }
}

impl WaitOutcome {
    /// Shell-style `$?` for a finished job: the exit code, or `128 + signal`
    /// when the job was killed. `None` for stop/continue, which leave `$?`
    /// alone.
    pub fn shell_status(self) -> Option<i32> {
        match self {
            WaitOutcome::Exited(code) => Some(code),
            WaitOutcome::Signaled(signal) => Some(128 + signal),
            WaitOutcome::Stopped(_) | WaitOutcome::Continued => None,
        }
    }
}
