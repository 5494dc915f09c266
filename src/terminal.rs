use crate::error::JobError;
use crate::sys::System;

/// Which process group owns the controlling terminal on standard input.
pub struct TerminalController<'a, S: System> {
    sys: &'a S,
    fd: libc::c_int,
}

impl<'a, S: System> TerminalController<'a, S> {
    pub fn stdin(sys: &'a S) -> Self {
        Self {
            sys,
            fd: libc::STDIN_FILENO,
        }
    }

    pub fn current_foreground_pgid(&self) -> Result<libc::pid_t, JobError> {
        self.sys
            .foreground_pgid(self.fd)
            .map_err(|source| JobError::TerminalFailure {
                action: "query",
                source,
            })
    }

    pub fn set_foreground_pgid(&self, pgid: libc::pid_t) -> Result<(), JobError> {
        log::debug!("handing terminal to process group {pgid}");
        self.sys
            .set_foreground_pgid(self.fd, pgid)
            .map_err(|source| JobError::TerminalFailure {
                action: "set",
                source,
            })
    }
}

/// Terminal ownership lent to a foreground job.
///
/// Created by handing the terminal to the job; gives it back to the shell's
/// group on [`release`](Self::release), or on drop if never released.
pub struct ForegroundGuard<'a, S: System> {
    terminal: TerminalController<'a, S>,
    shell_pgid: libc::pid_t,
    released: bool,
}

impl<'a, S: System> ForegroundGuard<'a, S> {
    /// Remember who owns the terminal now, then give it to `target_pgid`.
    pub fn acquire(
        terminal: TerminalController<'a, S>,
        target_pgid: libc::pid_t,
    ) -> Result<Self, JobError> {
        let shell_pgid = terminal.current_foreground_pgid()?;
        terminal.set_foreground_pgid(target_pgid)?;
        Ok(Self {
            terminal,
            shell_pgid,
            released: false,
        })
    }

    /// Hand the terminal back to the shell.
    pub fn release(mut self) -> Result<(), JobError> {
        self.released = true;
        self.terminal.set_foreground_pgid(self.shell_pgid)
    }
}

impl<S: System> Drop for ForegroundGuard<'_, S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.terminal.set_foreground_pgid(self.shell_pgid) {
            log::warn!("could not reclaim the terminal: {err}");
        }
    }
}
