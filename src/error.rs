use std::io;

use thiserror::Error;

use crate::jobs::{JobId, TableError};

/// Failures surfaced by the foreground waiter and the background reaper.
///
/// "No more children" from a wait call is never one of these: it is the
/// normal end of a reap loop.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job id or process-group id does not name a live job.
    #[error("{0}: no such job")]
    InvalidJob(String),

    /// SIGCONT could not be delivered to the process group.
    #[error("failed to resume process group {pgid}: {source}")]
    SignalFailure { pgid: libc::pid_t, source: io::Error },

    /// Querying or transferring terminal ownership failed.
    #[error("failed to {action} terminal foreground group: {source}")]
    TerminalFailure {
        action: &'static str,
        source: io::Error,
    },

    /// `waitpid` failed for a reason other than ECHILD.
    #[error("failed to wait on process group {pgid}: {source}")]
    WaitFailure { pgid: libc::pid_t, source: io::Error },

    /// The job table refused a lookup or mutation mid-reap.
    #[error("job {jid}: {source}")]
    TableFailure { jid: JobId, source: TableError },
}

impl JobError {
    pub(crate) fn table(jid: JobId) -> impl FnOnce(TableError) -> JobError {
        move |source| JobError::TableFailure { jid, source }
    }
}
