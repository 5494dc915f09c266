use crate::jobs::JobTable;
use crate::sys::{Posix, System};

/// Everything the waiters read and write, owned by the running shell and
/// handed to them by `&mut`.
pub struct Session<S: System = Posix> {
    pub sys: S,
    pub jobs: JobTable,
    /// When false, no terminal-ownership call is ever made.
    pub interactive: bool,
    /// `$?`: written once per finished foreground job.
    pub last_status: i32,
}

impl<S: System> Session<S> {
    pub fn new(sys: S, interactive: bool) -> Self {
        Self {
            sys,
            jobs: JobTable::new(),
            interactive,
            last_status: 0,
        }
    }
}
