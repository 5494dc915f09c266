use std::io;

use crossterm::tty::IsTty;

const LOG_ENV: &str = "JSH_LOG";
const INTERACTIVE_ENV: &str = "JSH_INTERACTIVE";

/// Start-up settings, read once from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Job control with terminal hand-off; off when reading a script or pipe.
    pub interactive: bool,
    /// `env_logger` filter directives.
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(
            |name| std::env::var(name).ok(),
            io::stdin().is_tty(),
        )
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>, stdin_is_tty: bool) -> Self {
        let interactive = match var(INTERACTIVE_ENV).as_deref() {
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            _ => stdin_is_tty,
        };
        let log_filter = var(LOG_ENV)
            .filter(|filter| !filter.trim().is_empty())
            .unwrap_or_else(|| "warn".to_string());

        Self {
            interactive,
            log_filter,
        }
    }
}
