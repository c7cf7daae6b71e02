use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::{LogConfiguration, ModuleLogConfiguration};

// ISO 8601 timestamp, color coded level, then the module the message came from
const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";

impl From<&ModuleLogConfiguration> for Logger {
    fn from(module_config: &ModuleLogConfiguration) -> Self {
        Logger::builder().build(module_config.module.clone(), module_config.level)
    }
}

impl LogConfiguration {
    /// Installs or reconfigures the `log4rs` logger to match this [`LogConfiguration`].
    ///
    /// Messages go to stderr so that they do not interleave with the progress bar.
    pub(in crate::log) fn set_config(&mut self) {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build();
        let loggers = self
            .module_configurations
            .values()
            .map(Logger::from)
            .collect::<Vec<_>>();
        let config = Config::builder()
            .appender(Appender::builder().build("stderr", Box::new(stderr)))
            .loggers(loggers)
            .build(Root::builder().appender("stderr").build(self.global_log_level));

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                // Keep the previous logger; the level filter still applies to the macros.
                eprintln!("invalid logging configuration: {e}");
                log::set_max_level(self.global_log_level);
                return;
            }
        };

        if let Some(handle) = &self.root_handle {
            handle.set_config(config);
        } else {
            match log4rs::init_config(config) {
                Ok(handle) => self.root_handle = Some(handle),
                // Another logger was installed first (e.g. by a test harness).
                Err(_) => log::set_max_level(self.global_log_level),
            }
        }
    }
}
