use std::io::Write;

use crate::jobs::JobId;
use crate::session::Session;
use crate::sys::System;

/// The list of all builtin command names.
const BUILTINS: &[&str] = &["exit", "jobs", "fg", "bg"];

#[derive(Debug, PartialEq)]
pub enum BuiltinAction {
    Continue(i32),
    Exit(i32),
}

/// Returns true if the command name is a shell builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute a builtin command, writing output to the provided streams.
pub fn execute<S: System>(
    program: &str,
    args: &[String],
    session: &mut Session<S>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> BuiltinAction {
    match program {
        "exit" => builtin_exit(args, session.last_status, stderr),
        "jobs" => BuiltinAction::Continue(builtin_jobs(session, stdout, stderr)),
        "fg" => BuiltinAction::Continue(builtin_fg(args, session, stdout, stderr)),
        "bg" => BuiltinAction::Continue(builtin_bg(args, session, stdout, stderr)),
        _ => {
            let _ = writeln!(stderr, "jsh: unknown builtin: {program}");
            BuiltinAction::Continue(1)
        }
    }
}

fn builtin_exit(args: &[String], last_status: i32, stderr: &mut dyn Write) -> BuiltinAction {
    match args.first() {
        None => BuiltinAction::Exit(last_status),
        Some(s) => match s.parse::<i32>() {
            Ok(code) => BuiltinAction::Exit(code),
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                BuiltinAction::Exit(2)
            }
        },
    }
}

// ── Job control builtins ──

/// List all tracked jobs.
fn builtin_jobs<S: System>(
    session: &mut Session<S>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    // Reap first so finished jobs are announced rather than listed.
    if let Err(err) = session.reap_background_jobs(stderr) {
        let _ = writeln!(stderr, "jobs: {err}");
        return 1;
    }

    for job in session.jobs.iter() {
        let state = if job.is_stopped() { "Stopped" } else { "Running" };
        let _ = writeln!(stdout, "[{}]  {state:<9} {}", job.id, job.command);
    }
    0
}

/// Bring a background or stopped job to the foreground and wait for it.
fn builtin_fg<S: System>(
    args: &[String],
    session: &mut Session<S>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let Some(jid) = resolve_job_id(args.first(), session.jobs.most_recent_id(), stderr) else {
        return 1;
    };
    let Some(job) = session.jobs.get(jid) else {
        let _ = writeln!(stderr, "fg: %{jid}: no such job");
        return 1;
    };
    let _ = writeln!(stdout, "{}", job.command);

    match session.wait_on_fg_job(jid, stderr) {
        Ok(()) => session.last_status,
        Err(err) => {
            let _ = writeln!(stderr, "fg: {err}");
            1
        }
    }
}

/// Resume a stopped job in the background.
fn builtin_bg<S: System>(
    args: &[String],
    session: &mut Session<S>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let Some(jid) = resolve_job_id(args.first(), session.jobs.most_recent_stopped_id(), stderr)
    else {
        return 1;
    };
    let Some(job) = session.jobs.get(jid) else {
        let _ = writeln!(stderr, "bg: %{jid}: no such job");
        return 1;
    };
    if !job.is_stopped() {
        let _ = writeln!(stderr, "bg: job {jid} is not stopped");
        return 1;
    }

    let (pgid, command) = (job.pgid, job.command.clone());
    if let Err(err) = session.sys.continue_group(pgid) {
        let _ = writeln!(stderr, "bg: %{jid}: {err}");
        return 1;
    }
    let _ = session.jobs.mark_running(jid);
    let _ = writeln!(stdout, "[{jid}]  {command} &");
    0
}

// ── Helpers ──

/// Parse a job ID from an argument (accepts `%N` or `N`), falling back to
/// `default` when no argument is given.
fn resolve_job_id(
    arg: Option<&String>,
    default: Option<JobId>,
    stderr: &mut dyn Write,
) -> Option<JobId> {
    match arg {
        Some(s) => match s.trim_start_matches('%').parse::<JobId>() {
            Ok(id) => Some(id),
            Err(_) => {
                let _ = writeln!(stderr, "invalid job id: {s}");
                None
            }
        },
        None => {
            if default.is_none() {
                let _ = writeln!(stderr, "no current job");
            }
            default
        }
    }
}
