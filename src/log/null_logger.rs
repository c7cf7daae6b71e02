//! Stand-in backend used when the `logging` feature is disabled. Nothing is printed, but the
//! global level filter is still applied so the macros compile down to a cheap check.

use crate::log::LogConfiguration;

impl LogConfiguration {
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}
