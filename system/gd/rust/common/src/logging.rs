use crate::init_flags::{
    get_log_level_for_tag, LOG_TAG_DEBUG, LOG_TAG_ERROR, LOG_TAG_FATAL, LOG_TAG_INFO,
    LOG_TAG_VERBOSE, LOG_TAG_WARN,
};

const LOG_TAG: &str = "bt_le_advertising";

fn level_from_priority(priority: i32) -> log::LevelFilter {
    match priority {
        LOG_TAG_FATAL => log::LevelFilter::Error,
        LOG_TAG_ERROR => log::LevelFilter::Error,
        LOG_TAG_WARN => log::LevelFilter::Warn,
        LOG_TAG_INFO => log::LevelFilter::Info,
        LOG_TAG_DEBUG => log::LevelFilter::Debug,
        LOG_TAG_VERBOSE => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info, // default level
    }
}

fn get_log_level() -> log::LevelFilter {
    level_from_priority(get_log_level_for_tag(LOG_TAG))
}

/// Inits logging for Android
#[cfg(target_os = "android")]
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default().with_tag("bt").with_max_level(get_log_level()),
    );
    log::set_max_level(get_log_level())
}

/// Inits logging for host
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    env_logger::Builder::new().filter(None, get_log_level()).parse_default_env().try_init().ok();
    log::set_max_level(get_log_level())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_mapping() {
        assert_eq!(level_from_priority(LOG_TAG_VERBOSE), log::LevelFilter::Trace);
        assert_eq!(level_from_priority(LOG_TAG_FATAL), log::LevelFilter::Error);
        assert_eq!(level_from_priority(42), log::LevelFilter::Info);
    }
}
