//! Helpers for logging.
//!
//! The library crates only talk to the `log` facade.  Binaries and tests call one of the functions here to get output.
use std::io::Write;

/// Environment variable holding the filter, in `env_logger` syntax.
pub const LOG_ENV_VAR: &str = "TESSERA_LOG";

const DEFAULT_FILTER: &str = "info";

fn builder() -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV_VAR, DEFAULT_FILTER));

    builder.format(|buf, record| {
        let now = time::OffsetDateTime::now_utc();

        writeln!(
            buf,
            "{} {} time={} target={}",
            record.level(),
            record.args(),
            now,
            record.target()
        )
    });

    builder
}

/// Log to stderr.
///
/// If called multiple times in the same process, only applies once.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        builder().init();
    });
}

/// Like [log_to_stderr], but routes output through the test harness so that it is only shown for failing tests.
///
/// Safe to call at the top of every test.
pub fn log_to_stderr_for_tests() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        // log_to_stderr may already have installed a logger.
        let _ = builder().is_test(true).try_init();
    });
}
