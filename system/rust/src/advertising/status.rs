//! Status codes reported to advertising callers.

use std::fmt::{Debug, Formatter};

/// A raw status byte returned by the controller in a command-complete or
/// advertising-set-terminated event.
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// The command succeeded
    pub const SUCCESS: ErrorCode = ErrorCode(0x00);
    /// The command is not allowed in the current state
    pub const COMMAND_DISALLOWED: ErrorCode = ErrorCode(0x0c);
    /// The duration of an advertising set elapsed
    pub const ADVERTISING_TIMEOUT: ErrorCode = ErrorCode(0x3c);
    /// The advertising handle is unknown to the controller
    pub const UNKNOWN_ADVERTISING_IDENTIFIER: ErrorCode = ErrorCode(0x42);
    /// The maximum number of extended advertising events was sent
    pub const LIMIT_REACHED: ErrorCode = ErrorCode(0x43);

    /// Whether this status reports success
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl Debug for ErrorCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "ErrorCode({:#04x})", self.0)
    }
}

/// The outcome of an advertising operation, as seen by the caller.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum AdvertisingStatus {
    /// The operation succeeded
    Success,
    /// Generic failure, e.g. an unknown or released advertiser id
    Failure,
    /// Every advertising set is already allocated
    TooManyAdvertisers,
    /// The controller rejected a command with this status
    Controller(ErrorCode),
}

impl AdvertisingStatus {
    /// The numeric status code delivered over legacy interfaces.
    pub fn to_u8(self) -> u8 {
        match self {
            AdvertisingStatus::Success => 0,
            AdvertisingStatus::Failure => 1,
            AdvertisingStatus::TooManyAdvertisers => 2,
            AdvertisingStatus::Controller(code) => code.0,
        }
    }

    /// Whether this status reports success
    pub fn is_success(self) -> bool {
        self == AdvertisingStatus::Success
    }
}

impl From<ErrorCode> for AdvertisingStatus {
    fn from(code: ErrorCode) -> Self {
        if code.is_success() {
            AdvertisingStatus::Success
        } else {
            AdvertisingStatus::Controller(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_status_conversion() {
        assert_eq!(AdvertisingStatus::from(ErrorCode::SUCCESS), AdvertisingStatus::Success);
        assert_eq!(
            AdvertisingStatus::from(ErrorCode::LIMIT_REACHED),
            AdvertisingStatus::Controller(ErrorCode(0x43))
        );
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(AdvertisingStatus::Success.to_u8(), 0);
        assert_eq!(AdvertisingStatus::Failure.to_u8(), 1);
        assert_eq!(AdvertisingStatus::TooManyAdvertisers.to_u8(), 2);
        assert_eq!(AdvertisingStatus::from(ErrorCode::COMMAND_DISALLOWED).to_u8(), 0x0c);
    }
}
