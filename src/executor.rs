use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::process::Command;

use crate::builtins::{self, BuiltinAction};
use crate::jobs::JobId;
use crate::parser::Pipeline;
use crate::session::Session;
use crate::sys::{self, System};

/// Signals the interactive shell ignores; children must get them back.
pub(crate) const JOB_CONTROL_SIGNALS: [libc::c_int; 5] = [
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
];

/// Run one parsed line: a builtin in-process, anything else as a new job.
pub fn execute<S: System>(
    session: &mut Session<S>,
    pipeline: &Pipeline,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> BuiltinAction {
    if let [argv] = pipeline.stages.as_slice() {
        if builtins::is_builtin(&argv[0]) {
            let action = builtins::execute(&argv[0], &argv[1..], session, stdout, stderr);
            if let BuiltinAction::Continue(code) = action {
                session.last_status = code;
            }
            return action;
        }
    }

    let (jid, spawn_failure) = match spawn_pipeline(session, pipeline, stderr) {
        Ok(spawned) => spawned,
        Err(code) => {
            session.last_status = code;
            return BuiltinAction::Continue(code);
        }
    };

    if pipeline.background {
        if session.interactive {
            if let Ok(pgid) = session.jobs.pgid_of(jid) {
                let _ = writeln!(stderr, "[{jid}] {pgid}");
            }
        }
        session.last_status = 0;
    } else {
        match session.wait_on_fg_job(jid, stderr) {
            // The stage that never started is the pipeline's last one.
            Ok(()) if !session.jobs.contains(jid) => {
                if let Some(code) = spawn_failure {
                    session.last_status = code;
                }
            }
            Ok(()) => {}
            Err(err) => {
                let _ = writeln!(stderr, "jsh: {err}");
                session.last_status = 1;
            }
        }
    }

    BuiltinAction::Continue(session.last_status)
}

/// Start every stage of `pipeline` in one new process group and register
/// the group as a job.
///
/// Alongside the job id comes the exit status of a later stage that failed
/// to start, if any. `Err` carries the exit status to report when not even
/// the first stage could be started.
fn spawn_pipeline<S: System>(
    session: &mut Session<S>,
    pipeline: &Pipeline,
    stderr: &mut dyn Write,
) -> Result<(JobId, Option<i32>), i32> {
    let mut pgid: libc::pid_t = 0;
    let mut spawn_failure = None;
    let mut upstream: Option<os_pipe::PipeReader> = None;
    let last = pipeline.stages.len() - 1;

    for (index, argv) in pipeline.stages.iter().enumerate() {
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);

        if let Some(reader) = upstream.take() {
            command.stdin(reader);
        }
        if index < last {
            match os_pipe::pipe() {
                Ok((reader, writer)) => {
                    command.stdout(writer);
                    upstream = Some(reader);
                }
                Err(err) => {
                    let _ = writeln!(stderr, "jsh: pipe: {err}");
                    break;
                }
            }
        }

        let group = pgid;
        // SAFETY: only async-signal-safe calls between fork and exec.
        unsafe {
            command.pre_exec(move || {
                if libc::setpgid(0, group) < 0 {
                    return Err(io::Error::last_os_error());
                }
                for signal in JOB_CONTROL_SIGNALS {
                    libc::signal(signal, libc::SIG_DFL);
                }
                Ok(())
            });
        }

        match command.spawn() {
            Ok(child) => {
                let pid = child.id() as libc::pid_t;
                if pgid == 0 {
                    pgid = pid;
                }
                // Both sides call setpgid so the group exists no matter who
                // runs first.
                if let Err(err) = sys::set_process_group(pid, pgid) {
                    log::warn!("setpgid({pid}, {pgid}): {err}");
                }
                log::debug!("started {} as pid {pid} in group {pgid}", argv[0]);
            }
            Err(err) => {
                let code = report_spawn_error(&argv[0], &err, stderr);
                if pgid == 0 {
                    return Err(code);
                }
                // Earlier stages are running; they still have to be reaped.
                spawn_failure = Some(code);
                break;
            }
        }
    }

    if pgid == 0 {
        return Err(1);
    }
    let jid = session
        .jobs
        .register(pgid, pipeline.text.clone())
        .map_err(|err| {
            let _ = writeln!(stderr, "jsh: {err}");
            1
        })?;
    Ok((jid, spawn_failure))
}

fn report_spawn_error(program: &str, err: &io::Error, stderr: &mut dyn Write) -> i32 {
    if err.kind() == io::ErrorKind::NotFound {
        let _ = writeln!(stderr, "jsh: command not found: {program}");
        127
    } else {
        let _ = writeln!(stderr, "jsh: {program}: {err}");
        126
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::sys::Posix;

    fn run(session: &mut Session<Posix>, line: &str) -> (String, String) {
        let pipeline = parser::parse(line, session.last_status).unwrap().unwrap();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        execute(session, &pipeline, &mut stdout, &mut stderr);
        (
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn foreground_exit_code_lands_in_last_status() {
        let mut session = Session::new(Posix, false);
        run(&mut session, "sh -c 'exit 7'");
        assert_eq!(session.last_status, 7);
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn foreground_pipeline_is_fully_reaped() {
        let mut session = Session::new(Posix, false);
        run(&mut session, "yes | head -1 | sh -c 'cat >/dev/null; exit 3'");
        assert!(session.jobs.is_empty());
        assert_ne!(session.last_status, 127);
    }

    #[test]
    fn foreground_kill_reports_128_plus_signal() {
        let mut session = Session::new(Posix, false);
        run(&mut session, "sh -c 'kill -9 $$'");
        assert_eq!(session.last_status, 128 + libc::SIGKILL);
    }

    #[test]
    fn missing_program_is_127_and_registers_nothing() {
        let mut session = Session::new(Posix, false);
        let (_, stderr) = run(&mut session, "definitely-not-a-command-xyz");
        assert_eq!(session.last_status, 127);
        assert!(stderr.contains("command not found"), "stderr was: {stderr}");
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn missing_later_stage_sets_127_after_reaping_the_rest() {
        let mut session = Session::new(Posix, false);
        let (_, stderr) = run(&mut session, "echo hi | definitely-not-a-command-xyz");
        assert_eq!(session.last_status, 127);
        assert!(stderr.contains("command not found"), "stderr was: {stderr}");
        assert!(session.jobs.is_empty());
    }

    #[test]
    fn background_job_is_reaped_on_a_later_cycle() {
        let mut session = Session::new(Posix, false);
        run(&mut session, "sh -c 'exit 4' &");
        assert_eq!(session.jobs.len(), 1);
        assert_eq!(session.last_status, 0);

        let mut notices = Vec::new();
        for _ in 0..200 {
            session.reap_background_jobs(&mut notices).unwrap();
            if session.jobs.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(String::from_utf8(notices).unwrap(), "[1] Done\n");
    }

    #[test]
    fn stopped_foreground_job_can_be_resumed_with_fg() {
        let mut session = Session::new(Posix, false);
        let (_, stderr) = run(&mut session, "sh -c 'kill -STOP $$; exit 5'");
        assert_eq!(stderr, "[1] Stopped\n");
        assert_eq!(session.jobs.len(), 1);

        run(&mut session, "fg %1");
        assert_eq!(session.last_status, 5);
        assert!(session.jobs.is_empty());
    }
}
