//! Failure propagation policies.
//!
//! Two policies exist side by side:
//!
//! - **Propagate** at the script entry boundary: the failure is logged, then
//!   returned to the caller.
//! - **Suppress** at leaf service calls (`data.load_csv`, ...): the failure is
//!   logged and the caller receives a fallback value, so a script keeps going.

use std::fmt::Display;

use crate::host_log::HostLog;

/// Log `Err` at error level and hand it back unchanged.
pub fn log_and_propagate<T, E: Display>(log: &HostLog, context: &str, result: Result<T, E>) -> Result<T, E> {
    if let Err(e) = &result {
        log.error(format!("{context}: {e}"));
    }
    result
}

/// Log `Err` at error level and replace it with `fallback()`.
pub fn log_and_suppress<T, E: Display>(
    log: &HostLog,
    context: &str,
    result: Result<T, E>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            log.error(format!("{context}: {e}"));
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_log::LogLevel;

    #[test]
    fn test_propagate_logs_and_returns_error() {
        let log = HostLog::new();
        let result: Result<(), String> = log_and_propagate(&log, "script failed", Err("boom".into()));
        assert_eq!(result, Err("boom".to_string()));
        assert!(log.contains(LogLevel::Error, "script failed: boom"));
    }

    #[test]
    fn test_suppress_returns_fallback() {
        let log = HostLog::new();
        let value = log_and_suppress(&log, "data.load_csv", Err::<Vec<u8>, _>("missing"), Vec::new);
        assert!(value.is_empty());
        assert!(log.contains(LogLevel::Error, "data.load_csv: missing"));
    }

    #[test]
    fn test_ok_is_not_logged() {
        let log = HostLog::new();
        assert_eq!(log_and_suppress(&log, "x", Ok::<_, String>(3), || 0), 3);
        assert_eq!(log_and_propagate(&log, "x", Ok::<_, String>(4)), Ok(4));
        assert!(log.is_empty());
    }
}
