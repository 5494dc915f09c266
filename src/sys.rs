use std::io;

use crate::status::{WaitEvent, WaitStatus};

/// Options for [`System::wait_group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    flags: libc::c_int,
}

impl WaitOptions {
    /// Block until a member of the group terminates.
    pub const fn new() -> Self {
        Self { flags: 0 }
    }

    /// Return immediately if no member has changed state.
    pub const fn no_hang(mut self) -> Self {
        self.flags |= libc::WNOHANG;
        self
    }

    /// Also report members that have stopped.
    pub const fn untraced(mut self) -> Self {
        self.flags |= libc::WUNTRACED;
        self
    }

    pub const fn is_no_hang(self) -> bool {
        self.flags & libc::WNOHANG != 0
    }
}

/// The handful of process-control calls the waiters are built on.
///
/// Every method takes `&self` so that a terminal guard can hold the system
/// while the wait loop keeps using it.
pub trait System {
    /// Send SIGCONT to every member of `pgid`.
    fn continue_group(&self, pgid: libc::pid_t) -> io::Result<()>;

    /// One `waitpid(-pgid, ...)` call. EINTR is retried; ECHILD becomes
    /// [`WaitEvent::NoMoreChildren`].
    fn wait_group(&self, pgid: libc::pid_t, options: WaitOptions) -> io::Result<WaitEvent>;

    /// `tcgetpgrp(fd)`.
    fn foreground_pgid(&self, fd: libc::c_int) -> io::Result<libc::pid_t>;

    /// `tcsetpgrp(fd, pgid)`.
    fn set_foreground_pgid(&self, fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()>;
}

/// The real thing, straight onto libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct Posix;

impl System for Posix {
    fn continue_group(&self, pgid: libc::pid_t) -> io::Result<()> {
        signal_group(pgid, libc::SIGCONT)
    }

    fn wait_group(&self, pgid: libc::pid_t, options: WaitOptions) -> io::Result<WaitEvent> {
        if pgid <= 0 {
            return Err(invalid_pgid());
        }

        let mut raw_status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(-pgid, &mut raw_status, options.flags) };
            if rc > 0 {
                return Ok(WaitEvent::Changed {
                    pid: rc,
                    status: WaitStatus::from_raw(raw_status),
                });
            }
            if rc == 0 && options.is_no_hang() {
                return Ok(WaitEvent::NotReady);
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECHILD) => return Ok(WaitEvent::NoMoreChildren),
                _ => return Err(err),
            }
        }
    }

    fn foreground_pgid(&self, fd: libc::c_int) -> io::Result<libc::pid_t> {
        let rc = unsafe { libc::tcgetpgrp(fd) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(rc)
    }

    fn set_foreground_pgid(&self, fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
        if pgid <= 0 {
            return Err(invalid_pgid());
        }

        // A background caller gets SIGTTOU from tcsetpgrp; it must not stop us.
        let _sigttou = SignalIgnoreGuard::ignore(libc::SIGTTOU)?;
        loop {
            let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
            if rc == 0 {
                return Ok(());
            }

            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
    }
}

/// Send `signal` to every process in the group `pgid`.
pub(crate) fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(invalid_pgid());
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// `setpgid` tolerant of children that have already exec'd or exited.
pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            // The child already did it itself, or is gone; either way the
            // waiter will sort it out.
            Some(libc::EACCES) | Some(libc::ESRCH) => return Ok(()),
            _ => return Err(err),
        }
    }
}

fn invalid_pgid() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "invalid process group id")
}

/// Ignores one signal for its lifetime, then puts the old disposition back.
pub(crate) struct SignalIgnoreGuard {
    signal: libc::c_int,
    previous: libc::sighandler_t,
}

impl SignalIgnoreGuard {
    pub(crate) fn ignore(signal: libc::c_int) -> io::Result<Self> {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { signal, previous })
    }
}

impl Drop for SignalIgnoreGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, self.previous);
        }
    }
}
