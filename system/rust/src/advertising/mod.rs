//! LE multi-advertising: the advertising-set manager and its building blocks.

pub mod ad_data;
mod chain;
pub mod fragment;
pub mod hci;
pub mod instance;
pub mod manager;
pub mod mocks;
pub mod params;
pub mod rpa;
pub mod status;

use crate::core::address::AddressWithType;
use status::AdvertisingStatus;

/// Identifies an advertising set. Doubles as its controller handle.
pub type AdvertiserId = u8;

/// Reported along with a registration failure.
pub const INVALID_ADVERTISER_ID: AdvertiserId = 0xff;

/// Receives the id of a newly registered set and the registration status.
pub type RegisterCallback = Box<dyn FnOnce(AdvertiserId, AdvertisingStatus)>;
/// Receives the result of an operation.
pub type StatusCallback = Box<dyn FnOnce(AdvertisingStatus)>;
/// Receives the result of a parameter update and the TX power in use.
pub type ParametersCallback = Box<dyn FnOnce(AdvertisingStatus, i8)>;
/// Receives the id, the TX power and the result of starting a set.
pub type IdTxPowerStatusCallback = Box<dyn FnOnce(AdvertiserId, i8, AdvertisingStatus)>;
/// Invoked once when a set stops because its duration or event budget ran out.
pub type TimeoutCallback = Box<dyn FnOnce(AdvertisingStatus)>;
/// Like [`TimeoutCallback`], for sets started along with their registration.
pub type SetTimeoutCallback = Box<dyn FnOnce(AdvertiserId, AdvertisingStatus)>;
/// Receives the address a set advertises with, or None for an unknown set.
pub type OwnAddressCallback = Box<dyn FnOnce(Option<AddressWithType>)>;
