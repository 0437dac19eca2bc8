use env_logger::{fmt::Color, Builder, Env};
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{Level, LevelFilter};
use once_cell::sync::OnceCell;
use std::io::Write;

static INSTANCE: OnceCell<Logger> = OnceCell::new();

/// Process-wide logger: `env_logger` behind an `indicatif` bridge, so log
/// lines and progress bars share the terminal without tearing.
#[derive(Debug)]
pub struct Logger {
    multi_pg: MultiProgress,
}

impl Logger {
    /// Install the logger. `verbosity` counts `-v` occurrences; the
    /// `GTPACK_LOG` environment variable overrides it.
    pub fn init(verbosity: u8) {
        let env = Env::default().filter("GTPACK_LOG");

        let logger = Builder::new()
            .filter_level(Self::level_filter(verbosity))
            .format(|buf, record| {
                let mut level_style = buf.style();
                let color = match record.level() {
                    Level::Error => Color::Red,
                    Level::Warn  => Color::Yellow,
                    Level::Info  => Color::Green,
                    Level::Debug => Color::Blue,
                    Level::Trace => Color::Cyan,
                };
                level_style.set_color(color).set_bold(true);

                writeln!(
                    buf,
                    "[{} {: <5} {}] {}",
                    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                    level_style.value(record.level()),
                    record.target(),
                    record.args()
                )
            })
            .parse_env(env)
            .build();

        let multi_pg = MultiProgress::new();
        LogWrapper::new(multi_pg.clone(), logger)
            .try_init()
            .expect("Failed to wrap logger with multiprogress");

        INSTANCE.set(Self { multi_pg }).expect("Logger initialized twice");
    }

    fn level_filter(verbosity: u8) -> LevelFilter {
        match verbosity {
            0           => LevelFilter::Error,
            1           => LevelFilter::Warn,
            2           => LevelFilter::Info,
            3           => LevelFilter::Debug,
            4..=u8::MAX => LevelFilter::Trace,
        }
    }

    /// The shared progress-bar group. Bars must be attached here, or they
    /// will fight the log output for the terminal.
    pub fn multi() -> &'static MultiProgress {
        &INSTANCE.get().expect("Logger not initialized").multi_pg
    }

    /// [`Self::multi`] for callers that may run without an installed
    /// logger (library use, tests).
    pub fn try_multi() -> Option<&'static MultiProgress> {
        INSTANCE.get().map(|logger| &logger.multi_pg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_mapping() {
        assert_eq!(Logger::level_filter(0), LevelFilter::Error);
        assert_eq!(Logger::level_filter(1), LevelFilter::Warn);
        assert_eq!(Logger::level_filter(2), LevelFilter::Info);
        assert_eq!(Logger::level_filter(3), LevelFilter::Debug);
        assert_eq!(Logger::level_filter(200), LevelFilter::Trace);
    }
}
