use std::collections::BTreeMap;

use thiserror::Error;

use crate::status::WaitStatus;

pub type JobId = usize;

/// A single tracked process group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub pgid: libc::pid_t,
    pub command: String,
    /// Last raw status observed for any member of the group.
    pub last_status: Option<WaitStatus>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("not found")]
    NotFound,
    #[error("process group {0} is already tracked")]
    DuplicateGroup(libc::pid_t),
    #[error("no status has been recorded")]
    NoStatus,
}

/// The shell's job table: every process group launched and not yet reaped.
///
/// Anything in here that is not currently being waited on in the foreground
/// is a background job.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly launched group under the lowest free job id.
    pub fn register(&mut self, pgid: libc::pid_t, command: String) -> Result<JobId, TableError> {
        if self.jid_of(pgid).is_ok() {
            return Err(TableError::DuplicateGroup(pgid));
        }

        let id = (1..=self.jobs.len())
            .find(|id| !self.jobs.contains_key(id))
            .unwrap_or(self.jobs.len() + 1);
        self.jobs.insert(
            id,
            Job {
                id,
                pgid,
                command,
                last_status: None,
            },
        );
        Ok(id)
    }

    pub fn jid_of(&self, pgid: libc::pid_t) -> Result<JobId, TableError> {
        self.jobs
            .values()
            .find(|job| job.pgid == pgid)
            .map(|job| job.id)
            .ok_or(TableError::NotFound)
    }

    pub fn pgid_of(&self, jid: JobId) -> Result<libc::pid_t, TableError> {
        self.get(jid).map(|job| job.pgid).ok_or(TableError::NotFound)
    }

    pub fn status(&self, jid: JobId) -> Result<WaitStatus, TableError> {
        self.get(jid)
            .ok_or(TableError::NotFound)?
            .last_status
            .ok_or(TableError::NoStatus)
    }

    pub fn set_status(&mut self, jid: JobId, status: WaitStatus) -> Result<(), TableError> {
        let job = self.jobs.get_mut(&jid).ok_or(TableError::NotFound)?;
        job.last_status = Some(status);
        Ok(())
    }

    /// Forget a stale stop once the group has been sent SIGCONT.
    pub fn mark_running(&mut self, jid: JobId) -> Result<(), TableError> {
        let job = self.jobs.get_mut(&jid).ok_or(TableError::NotFound)?;
        job.last_status = None;
        Ok(())
    }

    pub fn remove_jid(&mut self, jid: JobId) -> Result<Job, TableError> {
        self.jobs.remove(&jid).ok_or(TableError::NotFound)
    }

    pub fn remove_pgid(&mut self, pgid: libc::pid_t) -> Result<Job, TableError> {
        let jid = self.jid_of(pgid)?;
        self.remove_jid(jid)
    }

    /// `(job id, pgid)` pairs in ascending job id order, detached from the
    /// table so it can be mutated while the snapshot is walked.
    pub fn background_jobs(&self) -> Vec<(JobId, libc::pid_t)> {
        self.jobs.values().map(|job| (job.id, job.pgid)).collect()
    }

    pub fn contains(&self, jid: JobId) -> bool {
        self.jobs.contains_key(&jid)
    }

    pub fn get(&self, jid: JobId) -> Option<&Job> {
        self.jobs.get(&jid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job id of the most recently registered job, the default for `fg`.
    pub fn most_recent_id(&self) -> Option<JobId> {
        self.jobs.keys().next_back().copied()
    }

    /// The default target for `bg`: the newest job whose last status is a
    /// stop.
    pub fn most_recent_stopped_id(&self) -> Option<JobId> {
        self.jobs
            .values()
            .rev()
            .find(|job| job.is_stopped())
            .map(|job| job.id)
    }
}

impl Job {
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.last_status.map(WaitStatus::decode),
            Some(crate::status::WaitOutcome::Stopped(_))
        )
    }
}
