use std::io::Write;

use crate::error::JobError;
use crate::jobs::Job;
use crate::session::Session;
use crate::status::{WaitEvent, WaitOutcome};
use crate::sys::{System, WaitOptions};

impl<S: System> Session<S> {
    /// Poll every background job once without blocking, announcing jobs
    /// that stopped or finished since the last cycle and dropping finished
    /// ones from the table.
    ///
    /// Any wait failure other than "no more children" aborts the whole
    /// cycle.
    pub fn reap_background_jobs(&mut self, notices: &mut dyn Write) -> Result<(), JobError> {
        if self.jobs.is_empty() {
            return Ok(());
        }
        log::debug!("polling {} background job(s)", self.jobs.len());
        let options = WaitOptions::new().untraced().no_hang();

        for (jid, pgid) in self.jobs.background_jobs() {
            if !self.jobs.contains(jid) {
                continue;
            }

            loop {
                let event = self
                    .sys
                    .wait_group(pgid, options)
                    .map_err(|source| JobError::WaitFailure { pgid, source })?;

                match event {
                    WaitEvent::NotReady => break,
                    WaitEvent::Changed { pid, status } => {
                        log::debug!("job {jid}: process {pid} changed state: {status:?}");
                        // Every member of a stopped group reports its own
                        // stop; the job is announced once.
                        let was_stopped = self.jobs.get(jid).is_some_and(Job::is_stopped);
                        self.jobs
                            .set_status(jid, status)
                            .map_err(JobError::table(jid))?;
                        if let WaitOutcome::Stopped(_) = status.decode() {
                            if !was_stopped {
                                let _ = writeln!(notices, "[{jid}] Stopped");
                            }
                        }
                    }
                    WaitEvent::NoMoreChildren => {
                        let status = self.jobs.status(jid).map_err(JobError::table(jid))?;
                        match status.decode() {
                            WaitOutcome::Exited(_) => {
                                let _ = writeln!(notices, "[{jid}] Done");
                            }
                            WaitOutcome::Signaled(_) => {
                                let _ = writeln!(notices, "[{jid}] Terminated");
                            }
                            WaitOutcome::Stopped(_) | WaitOutcome::Continued => {}
                        }
                        self.jobs
                            .remove_pgid(pgid)
                            .map_err(JobError::table(jid))?;
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::status::WaitStatus;
    use crate::sys::fake::{Call, FakeSystem};

    fn session() -> Session<FakeSystem> {
        Session::new(FakeSystem::new(10), true)
    }

    fn changed(pid: libc::pid_t, status: WaitStatus) -> io::Result<WaitEvent> {
        Ok(WaitEvent::Changed { pid, status })
    }

    fn reap(session: &mut Session<FakeSystem>) -> Result<String, JobError> {
        let mut notices = Vec::new();
        session.reap_background_jobs(&mut notices)?;
        Ok(String::from_utf8(notices).unwrap())
    }

    #[test]
    fn running_jobs_are_left_alone() {
        let mut session = session();
        session.jobs.register(500, "sleep 10".into()).unwrap();
        session.sys.script([Ok(WaitEvent::NotReady)]);

        assert_eq!(reap(&mut session).unwrap(), "");
        assert_eq!(session.jobs.len(), 1);
    }

    #[test]
    fn finished_job_is_announced_once_and_removed() {
        let mut session = session();
        let jid = session.jobs.register(500, "true".into()).unwrap();
        session
            .sys
            .script([changed(500, WaitStatus::exited(0)), Ok(WaitEvent::NoMoreChildren)]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Done\n");
        assert!(!session.jobs.contains(jid));

        // Nothing left to poll on the next cycle.
        assert_eq!(reap(&mut session).unwrap(), "");
        assert_eq!(session.sys.wait_calls(), 2);
    }

    #[test]
    fn killed_job_is_reported_terminated() {
        let mut session = session();
        for (pgid, command) in [(100, "a"), (200, "b"), (300, "c")] {
            session.jobs.register(pgid, command.into()).unwrap();
        }
        let jid = session.jobs.register(600, "sleep 100".into()).unwrap();
        assert_eq!(jid, 4);
        session.sys.script([
            Ok(WaitEvent::NotReady),
            Ok(WaitEvent::NotReady),
            Ok(WaitEvent::NotReady),
            changed(600, WaitStatus::signaled(libc::SIGKILL)),
            Ok(WaitEvent::NoMoreChildren),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[4] Terminated\n");
        assert!(!session.jobs.contains(4));
        assert_eq!(session.jobs.len(), 3);
    }

    #[test]
    fn a_pipeline_is_drained_in_one_cycle() {
        let mut session = session();
        session.jobs.register(500, "a | b".into()).unwrap();
        session.sys.script([
            changed(500, WaitStatus::exited(0)),
            changed(501, WaitStatus::signaled(libc::SIGPIPE)),
            Ok(WaitEvent::NoMoreChildren),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Terminated\n");
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn stopped_job_is_announced_and_kept() {
        let mut session = session();
        let jid = session.jobs.register(500, "vi".into()).unwrap();
        session.sys.script([
            changed(500, WaitStatus::stopped(libc::SIGTTIN)),
            Ok(WaitEvent::NotReady),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Stopped\n");
        assert!(session.jobs.get(jid).unwrap().is_stopped());

        session.sys.script([Ok(WaitEvent::NotReady)]);
        assert_eq!(reap(&mut session).unwrap(), "");
    }

    #[test]
    fn stopped_pipeline_is_announced_once() {
        let mut session = session();
        session.jobs.register(500, "a | b".into()).unwrap();
        session.sys.script([
            changed(500, WaitStatus::stopped(libc::SIGSTOP)),
            changed(501, WaitStatus::stopped(libc::SIGSTOP)),
            Ok(WaitEvent::NotReady),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Stopped\n");

        session.sys.script([Ok(WaitEvent::NotReady)]);
        assert_eq!(reap(&mut session).unwrap(), "");
    }

    #[test]
    fn foreground_stop_is_not_announced_again_by_the_reaper() {
        let mut session = session();
        let jid = session.jobs.register(500, "a | b".into()).unwrap();
        // The foreground waiter returns on the first member's stop and
        // leaves the second one pending.
        session
            .sys
            .script([changed(500, WaitStatus::stopped(libc::SIGTSTP))]);
        let mut notices = Vec::new();
        session.wait_on_fg_job(jid, &mut notices).unwrap();
        assert_eq!(String::from_utf8(notices).unwrap(), "[1] Stopped\n");

        session.sys.script([
            changed(501, WaitStatus::stopped(libc::SIGTSTP)),
            Ok(WaitEvent::NotReady),
        ]);
        assert_eq!(reap(&mut session).unwrap(), "");
        assert!(session.jobs.get(jid).unwrap().is_stopped());
    }

    #[test]
    fn stop_after_bg_is_announced_again() {
        let mut session = session();
        let jid = session.jobs.register(500, "vi".into()).unwrap();
        session
            .jobs
            .set_status(jid, WaitStatus::stopped(libc::SIGTSTP))
            .unwrap();
        session.jobs.mark_running(jid).unwrap();
        session.sys.script([
            changed(500, WaitStatus::stopped(libc::SIGTTIN)),
            Ok(WaitEvent::NotReady),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Stopped\n");
    }

    #[test]
    fn stopped_process_group_is_announced_once_across_cycles() {
        use std::os::unix::process::CommandExt;
        use std::process::Command;
        use std::time::Duration;

        use crate::sys::{Posix, signal_group};

        let mut first = Command::new("sleep").arg("5").process_group(0).spawn().unwrap();
        let pgid = first.id() as libc::pid_t;
        let mut second = Command::new("sleep")
            .arg("5")
            .process_group(pgid)
            .spawn()
            .unwrap();

        let mut session = Session::new(Posix, false);
        let jid = session.jobs.register(pgid, "sleep 5 | sleep 5".into()).unwrap();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            signal_group(pgid, libc::SIGSTOP).unwrap();
        });
        let mut notices = Vec::new();
        session.wait_on_fg_job(jid, &mut notices).unwrap();
        stopper.join().unwrap();
        // Let the second member's stop land too.
        std::thread::sleep(Duration::from_millis(100));

        for _ in 0..3 {
            session.reap_background_jobs(&mut notices).unwrap();
        }
        assert_eq!(String::from_utf8(notices).unwrap(), "[1] Stopped\n");
        assert!(session.jobs.get(jid).unwrap().is_stopped());

        signal_group(pgid, libc::SIGKILL).unwrap();
        while let Ok(WaitEvent::Changed { .. }) = session.sys.wait_group(pgid, WaitOptions::new())
        {}
        let _ = first.try_wait();
        let _ = second.try_wait();
    }

    #[test]
    fn removal_does_not_skip_the_following_job() {
        let mut session = session();
        session.jobs.register(100, "first".into()).unwrap();
        session.jobs.register(200, "second".into()).unwrap();
        session.sys.script([
            changed(100, WaitStatus::exited(0)),
            Ok(WaitEvent::NoMoreChildren),
            changed(200, WaitStatus::exited(1)),
            Ok(WaitEvent::NoMoreChildren),
        ]);

        assert_eq!(reap(&mut session).unwrap(), "[1] Done\n[2] Done\n");
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn wait_failure_aborts_the_whole_cycle() {
        let mut session = session();
        session.jobs.register(100, "first".into()).unwrap();
        session.jobs.register(200, "second".into()).unwrap();
        session
            .sys
            .script([Err(io::Error::from_raw_os_error(libc::EINVAL))]);

        let err = reap(&mut session).unwrap_err();

        assert!(matches!(err, JobError::WaitFailure { pgid: 100, .. }));
        assert_eq!(session.sys.wait_calls(), 1);
        assert_eq!(session.jobs.len(), 2);
    }

    #[test]
    fn polls_without_blocking_and_never_touches_the_terminal() {
        let mut session = session();
        session.jobs.register(500, "sleep 10".into()).unwrap();
        session.sys.script([Ok(WaitEvent::NotReady)]);

        reap(&mut session).unwrap();

        assert_eq!(
            *session.sys.calls.borrow(),
            vec![Call::Wait(500, WaitOptions::new().untraced().no_hang())]
        );
    }

    #[test]
    fn reaping_does_not_touch_the_exit_status() {
        let mut session = session();
        session.last_status = 9;
        session.jobs.register(500, "false".into()).unwrap();
        session
            .sys
            .script([changed(500, WaitStatus::exited(1)), Ok(WaitEvent::NoMoreChildren)]);

        reap(&mut session).unwrap();

        assert_eq!(session.last_status, 9);
    }
}
