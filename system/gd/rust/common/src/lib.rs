//! Bluetooth common library

/// Provides runtime configured-at-startup flags
pub mod init_flags;

/// Provides logging initialization
pub mod logging;

pub use logging::init_logging;
