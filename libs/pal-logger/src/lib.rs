// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A `log` implementation printing one timestamped line per record to stderr:
//!
//! ```text
//! [INFO  0.004211 pal::region] DMA region initialized 0x1000..0x2000
//! ```

use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use log::{LevelFilter, Metadata, Record, SetLoggerError};

static LOGGER: OnceLock<Logger> = OnceLock::new();
static START: OnceLock<Instant> = OnceLock::new();

struct Logger {
    clock: fn() -> Duration,
}

/// Installs the logger, timestamping records with the time since this call.
pub fn init(filter: LevelFilter) -> Result<(), SetLoggerError> {
    START.get_or_init(Instant::now);
    init_with_clock(filter, since_start)
}

/// Installs the logger with a custom timestamp source, e.g. the uptime of the
/// platform under test.
pub fn init_with_clock(
    filter: LevelFilter,
    clock: fn() -> Duration,
) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(|| Logger { clock });
    log::set_logger(logger)?;
    log::set_max_level(filter);
    Ok(())
}

/// Formats `record` the way the logger prints it.
pub fn write_record(out: &mut impl Write, at: Duration, record: &Record<'_>) -> io::Result<()> {
    writeln!(
        out,
        "[{:<5} {}.{:06} {}] {}",
        record.level(),
        at.as_secs(),
        at.subsec_micros(),
        record.module_path().unwrap_or_default(),
        record.args()
    )
}

fn since_start() -> Duration {
    START.get_or_init(Instant::now).elapsed()
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = write_record(&mut io::stderr().lock(), (self.clock)(), record);
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}
