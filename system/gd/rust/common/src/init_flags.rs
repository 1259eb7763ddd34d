//! Flags handed to the stack when it starts, in the form `INIT_<name>=<value>`.
//!
//! Only the logging related flags are understood here; anything else is
//! reported and skipped.

use lazy_static::lazy_static;
use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Mutex;

/// Android log priorities, as used by the log-level flags.
pub const LOG_TAG_VERBOSE: i32 = 2;
pub const LOG_TAG_DEBUG: i32 = 3;
pub const LOG_TAG_INFO: i32 = 4;
pub const LOG_TAG_WARN: i32 = 5;
pub const LOG_TAG_ERROR: i32 = 6;
pub const LOG_TAG_FATAL: i32 = 7;

#[derive(Debug, Clone)]
struct InitFlags {
    default_log_level: i32,
    log_level_for_tags: HashMap<String, i32>,
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags { default_log_level: LOG_TAG_INFO, log_level_for_tags: HashMap::new() }
    }
}

lazy_static! {
    static ref FLAGS: Mutex<InitFlags> = Mutex::new(InitFlags::default());
}

fn parse_log_level(value: &str) -> Option<i32> {
    match value {
        "LOG_VERBOSE" => Some(LOG_TAG_VERBOSE),
        "LOG_DEBUG" => Some(LOG_TAG_DEBUG),
        "LOG_INFO" => Some(LOG_TAG_INFO),
        "LOG_NOTICE" => Some(LOG_TAG_INFO),
        "LOG_WARN" => Some(LOG_TAG_WARN),
        "LOG_ERROR" => Some(LOG_TAG_ERROR),
        "LOG_FATAL" => Some(LOG_TAG_FATAL),
        _ => None,
    }
}

impl InitFlags {
    fn parse(raw: &[String]) -> Self {
        let mut flags = InitFlags::default();

        for flag in raw {
            let (name, value) = match flag.strip_prefix("INIT_").and_then(|f| f.split_once('=')) {
                Some(pair) => pair,
                None => {
                    error!("Bad flag {}, must be in <FLAG>=<VALUE> format", flag);
                    continue;
                }
            };

            match name {
                "default_log_level_str" => match parse_log_level(value) {
                    Some(level) => flags.default_log_level = level,
                    None => error!("Unknown log level {}", value),
                },
                "logging_debug_enabled_for_tags" => {
                    for tag in value.split(',').filter(|t| !t.is_empty()) {
                        flags.log_level_for_tags.insert(tag.to_string(), LOG_TAG_DEBUG);
                    }
                }
                "log_level_for_tags" => {
                    for entry in value.split(',').filter(|t| !t.is_empty()) {
                        let parsed = entry
                            .split_once(':')
                            .and_then(|(tag, level)| Some((tag, parse_log_level(level)?)));
                        match parsed {
                            Some((tag, level)) => {
                                flags.log_level_for_tags.insert(tag.to_string(), level);
                            }
                            None => error!("Bad tag level entry {}", entry),
                        }
                    }
                }
                _ => warn!("Ignoring unknown init flag {}", name),
            }
        }

        flags
    }
}

/// Replaces the current flags with the parsed contents of `raw`.
pub fn load(raw: Vec<String>) {
    let flags = InitFlags::parse(&raw);
    info!("Loaded init flags: {:?}", flags);
    if let Ok(mut current) = FLAGS.lock() {
        *current = flags;
    }
}

/// Returns the Android log priority configured for `tag`.
pub fn get_log_level_for_tag(tag: &str) -> i32 {
    match FLAGS.lock() {
        Ok(flags) => *flags.log_level_for_tags.get(tag).unwrap_or(&flags.default_log_level),
        Err(_) => LOG_TAG_INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_level() {
        let flags = InitFlags::parse(&[]);
        assert_eq!(flags.default_log_level, LOG_TAG_INFO);
        assert!(flags.log_level_for_tags.is_empty());
    }

    #[test]
    fn test_parse_levels() {
        let flags = InitFlags::parse(&strings(&[
            "INIT_default_log_level_str=LOG_WARN",
            "INIT_log_level_for_tags=bt_adv:LOG_VERBOSE,bt_rpa:LOG_ERROR",
            "INIT_logging_debug_enabled_for_tags=bt_hci",
        ]));
        assert_eq!(flags.default_log_level, LOG_TAG_WARN);
        assert_eq!(flags.log_level_for_tags.get("bt_adv"), Some(&LOG_TAG_VERBOSE));
        assert_eq!(flags.log_level_for_tags.get("bt_rpa"), Some(&LOG_TAG_ERROR));
        assert_eq!(flags.log_level_for_tags.get("bt_hci"), Some(&LOG_TAG_DEBUG));
    }

    #[test]
    fn test_bad_flags_are_skipped() {
        let flags = InitFlags::parse(&strings(&[
            "default_log_level_str=LOG_WARN",
            "INIT_default_log_level_str=LOG_LOUD",
            "INIT_log_level_for_tags=broken",
            "INIT_something_else=true",
        ]));
        assert_eq!(flags.default_log_level, LOG_TAG_INFO);
        assert!(flags.log_level_for_tags.is_empty());
    }
}
