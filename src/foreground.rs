use std::io::Write;

use crate::error::JobError;
use crate::jobs::{JobId, JobTable};
use crate::session::Session;
use crate::status::{WaitEvent, WaitOutcome};
use crate::sys::{System, WaitOptions};
use crate::terminal::{ForegroundGuard, TerminalController};

impl<S: System> Session<S> {
    /// Run job `jid` in the foreground until it finishes or stops.
    pub fn wait_on_fg_job(&mut self, jid: JobId, notices: &mut dyn Write) -> Result<(), JobError> {
        let pgid = self
            .jobs
            .pgid_of(jid)
            .map_err(|_| JobError::InvalidJob(format!("%{jid}")))?;
        self.wait_on_fg_pgid(pgid, notices)
    }

    /// Resume process group `pgid`, give it the terminal when interactive,
    /// and block until every member has been reaped or one of them stops.
    ///
    /// On a clean finish `$?` is set and the job is gone from the table. On
    /// a stop the job stays registered and `[<id>] Stopped` is written to
    /// `notices`. Whatever happens, an interactive shell gets the terminal
    /// back before this returns.
    pub fn wait_on_fg_pgid(
        &mut self,
        pgid: libc::pid_t,
        notices: &mut dyn Write,
    ) -> Result<(), JobError> {
        if pgid <= 0 {
            return Err(JobError::InvalidJob(pgid.to_string()));
        }
        let jid = self
            .jobs
            .jid_of(pgid)
            .map_err(|_| JobError::InvalidJob(pgid.to_string()))?;

        let Session {
            sys,
            jobs,
            interactive,
            last_status,
        } = self;
        let sys = &*sys;

        sys.continue_group(pgid)
            .map_err(|source| JobError::SignalFailure { pgid, source })?;

        let guard = if *interactive {
            Some(ForegroundGuard::acquire(TerminalController::stdin(sys), pgid)?)
        } else {
            None
        };

        let result = reap_foreground(sys, jobs, last_status, jid, pgid, notices);

        let Some(guard) = guard else {
            return result;
        };
        match (result, guard.release()) {
            (Err(err), Err(restore)) => {
                log::warn!("{restore} (while handling: {err})");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), restored) => restored,
        }
    }
}

fn reap_foreground<S: System>(
    sys: &S,
    jobs: &mut JobTable,
    last_status: &mut i32,
    jid: JobId,
    pgid: libc::pid_t,
    notices: &mut dyn Write,
) -> Result<(), JobError> {
    loop {
        let event = sys
            .wait_group(pgid, WaitOptions::new().untraced())
            .map_err(|source| JobError::WaitFailure { pgid, source })?;

        match event {
            WaitEvent::Changed { pid, status } => {
                log::debug!("job {jid}: process {pid} changed state: {status:?}");
                jobs.set_status(jid, status).map_err(JobError::table(jid))?;
                if let WaitOutcome::Stopped(_) = status.decode() {
                    let _ = writeln!(notices, "[{jid}] Stopped");
                    return Ok(());
                }
            }
            WaitEvent::NoMoreChildren => {
                // The final wait carries no status; the previous one stands
                // for the whole pipeline.
                let status = jobs.status(jid).map_err(JobError::table(jid))?;
                if let Some(code) = status.decode().shell_status() {
                    *last_status = code;
                }
                jobs.remove_jid(jid).map_err(JobError::table(jid))?;
                return Ok(());
            }
            // Only possible with WNOHANG; a spurious one just means wait again.
            WaitEvent::NotReady => {}
        }
    }
}
