use std::{env, fmt::Display};

use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata};

/// Dependencies only get to speak up when something is wrong
const DEPENDENCY_LEVEL: Level = Level::Warn;

/// Installs the terminal logger.
///
/// Local crates log at info, or at the level named by `JUKEBOX_LOG` (e.g. `debug`).
pub fn init_logger() {
    let local_level = env::var("JUKEBOX_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{} {} {:^8} {}",
                level_badge(record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                Target::of(record.target()),
                message
            ))
        })
        .filter(move |meta| is_enabled(meta, local_level))
        .chain(std::io::stdout())
        .apply();

    if let Err(e) = result {
        eprintln!("Could not install the logger: {e}");
    }
}

fn is_enabled(meta: &Metadata, local_level: LevelFilter) -> bool {
    match Target::of(meta.target()) {
        Target::Dependency(_) => meta.level() <= DEPENDENCY_LEVEL,
        _ => meta.level() <= local_level,
    }
}

enum Target<'a> {
    Dependency(&'a str),
    Jukebox,
    Core,
    Collab,
    Server,
}

impl<'a> Target<'a> {
    fn of(target: &'a str) -> Self {
        let krate = target.split("::").next().unwrap_or(target);

        match krate {
            "jukebox" => Self::Jukebox,
            "jukebox_core" => Self::Core,
            "jukebox_collab" => Self::Collab,
            "jukebox_server" => Self::Server,
            other => Self::Dependency(other),
        }
    }
}

impl Display for Target<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label: ColoredString = match self {
            Self::Dependency(name) => name.dimmed(),
            Self::Jukebox => "JUKEBOX".bright_yellow(),
            Self::Core => "CORE".blue(),
            Self::Collab => "COLLAB".bright_purple(),
            Self::Server => "SERVER".bright_green(),
        };

        Display::fmt(&label, f)
    }
}

fn level_badge(level: Level) -> ColoredString {
    match level {
        Level::Error => " ERR ".black().on_red().bold(),
        Level::Warn => " WRN ".black().on_yellow().bold(),
        Level::Info => " INF ".black().on_blue().bold(),
        Level::Debug => " DBG ".white().on_black(),
        Level::Trace => " TRC ".normal(),
    }
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Metadata};

    use super::is_enabled;

    fn meta(target: &str, level: Level) -> Metadata<'_> {
        Metadata::builder().target(target).level(level).build()
    }

    #[test]
    fn dependencies_only_log_problems() {
        let info = LevelFilter::Info;

        assert!(is_enabled(&meta("jukebox_collab::rooms", Level::Info), info));
        assert!(!is_enabled(&meta("jukebox_collab::rooms", Level::Debug), info));
        assert!(is_enabled(&meta("jukebox_server", Level::Debug), LevelFilter::Debug));

        assert!(!is_enabled(&meta("sqlx::query", Level::Info), LevelFilter::Trace));
        assert!(is_enabled(&meta("hyper::proto", Level::Warn), info));
    }
}
