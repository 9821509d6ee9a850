use std::fmt::Display;

use colored::Colorize;
use log::{LevelFilter, SetLoggerError};

/// Set to `debug` to also see connection bookkeeping from the workspace crates
const VERBOSITY_VAR: &str = "WAITWISE_LOG";

/// Installs the stdout logger.
///
/// Workspace crates log from `info` (or `debug` when [VERBOSITY_VAR] asks for it),
/// everything else is limited to warnings and errors.
pub fn init_logger() -> Result<(), SetLoggerError> {
    let local_level = local_level(std::env::var(VERBOSITY_VAR).ok().as_deref());

    fern::Dispatch::new()
        .format(|out, message, record| {
            let origin = Origin::of(record.target());
            let time = chrono::Local::now().format("%H:%M:%S").to_string();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                badge(record.level()),
                time.bright_black(),
                origin,
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for("waitwise", local_level)
        .level_for("waitwise_core", local_level)
        .level_for("waitwise_collab", local_level)
        .level_for("waitwise_server", local_level)
        .chain(std::io::stdout())
        .apply()
}

fn local_level(verbosity: Option<&str>) -> LevelFilter {
    match verbosity.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("debug") => LevelFilter::Debug,
        Some(v) if v.eq_ignore_ascii_case("warn") => LevelFilter::Warn,
        _ => LevelFilter::Info,
    }
}

/// Label printed next to each record
enum Origin {
    Binary,
    Core,
    Collab,
    Server,
    Dependency(String),
}

impl Origin {
    fn of(target: &str) -> Self {
        let krate = target.split("::").next().unwrap_or_default();

        match krate {
            "waitwise" => Self::Binary,
            "waitwise_core" => Self::Core,
            "waitwise_collab" => Self::Collab,
            "waitwise_server" => Self::Server,
            other => Self::Dependency(other.to_string()),
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Binary => "WAITWISE".bright_cyan(),
            Self::Core => "CORE".blue(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Server => "SERVER".bright_green(),
            Self::Dependency(name) => name.as_str().clear(),
        };

        Display::fmt(&label, f)
    }
}

fn badge(level: log::Level) -> String {
    use log::Level::*;

    match level {
        Error => " ERR ".black().on_red().bold().to_string(),
        Warn => " WRN ".black().on_yellow().bold().to_string(),
        Info => " INF ".black().on_blue().bold().to_string(),
        Debug => " DBG ".white().on_black().to_string(),
        Trace => " TRC ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_workspace_crates() {
        assert!(matches!(Origin::of("waitwise_collab::queues"), Origin::Collab));
        assert!(matches!(Origin::of("waitwise"), Origin::Binary));
        assert!(matches!(Origin::of("sqlx::query"), Origin::Dependency(name) if name == "sqlx"));
    }

    #[test]
    fn verbosity_defaults_to_info() {
        assert_eq!(local_level(None), LevelFilter::Info);
        assert_eq!(local_level(Some("nonsense")), LevelFilter::Info);
        assert_eq!(local_level(Some(" DEBUG ")), LevelFilter::Debug);
        assert_eq!(local_level(Some("warn")), LevelFilter::Warn);
    }
}
