#[cfg(not(unix))]
compile_error!("jsh needs POSIX job control and only builds on Unix");

mod builtins;
mod config;
mod error;
mod executor;
mod foreground;
mod jobs;
mod parser;
mod reaper;
mod session;
mod status;
mod sys;
mod terminal;

use std::io::{self, Write};

use builtins::BuiltinAction;
use config::Config;
use error::JobError;
use session::Session;
use sys::Posix;
use terminal::TerminalController;

fn main() {
    let config = Config::from_env();
    init_logger(&config);

    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    let interactive = config.interactive
        && take_terminal()
            .inspect_err(|err| log::warn!("job control disabled: {err}"))
            .is_ok();

    let mut session = Session::new(Posix, interactive);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        if let Err(err) = session.reap_background_jobs(&mut stderr) {
            eprintln!("jsh: {err}");
        }

        if session.interactive {
            print!("jsh> ");
            if stdout.flush().is_err() {
                break;
            }
        }

        let mut input = String::new();
        match stdin.read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                eprintln!("Error reading input: {error}");
                break;
            }
        }

        let pipeline = match parser::parse(&input, session.last_status) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("jsh: {message}");
                session.last_status = 2;
                continue;
            }
        };

        if let BuiltinAction::Exit(code) =
            executor::execute(&mut session, &pipeline, &mut stdout, &mut stderr)
        {
            std::process::exit(code);
        }
    }

    std::process::exit(session.last_status);
}

fn init_logger(config: &Config) {
    let _ = env_logger::Builder::new()
        .parse_filters(&config.log_filter)
        .format(|buf, record| writeln!(buf, "jsh: {}", record.args()))
        .try_init();
}

/// Put the shell in its own process group and make that group the
/// terminal's foreground group, so jobs can be handed the terminal and
/// handed it back.
fn take_terminal() -> Result<(), JobError> {
    // Keyboard stop signals belong to jobs, not the shell.
    for signal in [libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU] {
        unsafe {
            libc::signal(signal, libc::SIG_IGN);
        }
    }

    let pid = unsafe { libc::getpid() };
    if unsafe { libc::getpgrp() } != pid {
        sys::set_process_group(pid, pid).map_err(|source| JobError::TerminalFailure {
            action: "join",
            source,
        })?;
    }
    TerminalController::stdin(&Posix).set_foreground_pgid(pid)
}
