//! Logging setup with progress-bar integration

use indicatif::MultiProgress;

/// Logger that routes records through a `MultiProgress` so log lines never
/// tear active progress bars.
pub struct LogBridge {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl LogBridge {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{:<5}] {}", record.level(), record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging.
///
/// TTY mode routes records through the progress context; non-TTY mode is a
/// plain env_logger with millisecond timestamps for log aggregation.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    match multi {
        Some(multi) => {
            let logger = env_logger::Builder::from_env(env).build();
            let max_level = logger.filter();
            let bridge = LogBridge::new(logger, multi.clone());
            if log::set_boxed_logger(Box::new(bridge)).is_ok() {
                log::set_max_level(max_level);
            }
        }
        None => {
            env_logger::Builder::from_env(env)
                .format_timestamp_millis()
                .init();
        }
    }
}
