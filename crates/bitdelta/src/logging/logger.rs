// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger singleton.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

struct GlobalLogger {
    output: Arc<dyn Output>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        self.output.write(level, message)
    }
}

/// Install the global logger. Only the first call takes effect; later calls
/// are ignored so library and application initialization cannot race.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| {
        Arc::new(Mutex::new(GlobalLogger {
            output,
            level_filter: level,
        }))
    });
}

/// Called by the logging macros. A no-op until [`init_logger`] runs.
#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => {
            let guard = logger
                .lock()
                .map_err(|_| io::Error::other("global logger mutex poisoned"))?;
            guard.log(level, message)
        }
        None => Ok(()),
    }
}

/// Flush the active output. Safe to call before initialization.
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => {
            let guard = logger
                .lock()
                .map_err(|_| io::Error::other("global logger mutex poisoned"))?;
            guard.output.flush()
        }
        None => Ok(()),
    }
}
