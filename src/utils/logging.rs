use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Initialize the logger. Timestamps are UTC so daemon logs line up with
/// the interval timestamps in reports and sink rows.
pub fn init_logger(level: LevelFilter) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, level)
        .init();
}

/// Get log level from string, defaulting to info for unknown values
pub fn get_log_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_is_case_insensitive_with_info_fallback() {
        assert_eq!(get_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(get_log_level("trace"), LevelFilter::Trace);
        assert_eq!(get_log_level("nonsense"), LevelFilter::Info);
    }
}
