//! Shared log capture.
//!
//! `logtest` installs a process-wide logger, so every test capturing logs
//! goes through one [`LoggerHandle`] and should also run under
//! `#[serial]`.

use std::sync::{Mutex, MutexGuard, OnceLock};

use logtest::Logger;
use rstest::fixture;

/// Exclusive handle to the global [`Logger`].
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global logger, discarding records left by earlier tests.
    #[expect(
        clippy::new_without_default,
        reason = "acquiring the handle blocks, which a Default impl would hide"
    )]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while guard.pop().is_some() {}

        Self { guard }
    }

    /// Drain captured records, returning their messages.
    pub fn messages(&mut self) -> Vec<(log::Level, String)> {
        let mut out = Vec::new();
        while let Some(record) = self.guard.pop() {
            out.push((record.level(), record.args().to_string()));
        }
        out
    }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
