//! The boundary between the advertising manager and the controller.
//!
//! Every command method dispatches its command immediately and returns a
//! future that resolves with the command-complete status. Dropping the
//! future without awaiting it therefore sends the command "fire and forget",
//! and commands reach the controller in the order the methods were called.

use futures::future::LocalBoxFuture;

use crate::core::address::{AddressType, AddressWithType, RawAddress};

use super::{
    params::{AdvertisingEventProperties, LePhy, PeriodicAdvertisingParameters},
    status::ErrorCode,
};

/// The controller-visible handle of an advertising set.
pub type AdvertisingHandle = u8;

/// Position of a data fragment within a multi-command payload transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FragmentOperation {
    /// Intermediate fragment of fragmented data
    Intermediate = 0x00,
    /// First fragment of fragmented data
    First = 0x01,
    /// Last fragment of fragmented data
    Last = 0x02,
    /// Complete data in a single command
    Complete = 0x03,
}

/// Fragment_Preference asking the controller not to fragment the data further.
pub const FRAGMENT_PREFERENCE_SHOULD_NOT_FRAGMENT: u8 = 0x01;

/// One entry of a (possibly batched) LE Set Extended Advertising Enable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EnableSet {
    /// The set to enable or disable
    pub handle: AdvertisingHandle,
    /// In 10 ms units, 0 for no limit
    pub duration: u16,
    /// 0 for no limit
    pub max_extended_advertising_events: u8,
}

/// Arguments of LE Set Extended Advertising Parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedAdvertisingParameters {
    pub event_properties: AdvertisingEventProperties,
    pub min_interval: u32,
    pub max_interval: u32,
    pub channel_map: u8,
    pub own_address_type: AddressType,
    pub own_address: RawAddress,
    pub peer_address: AddressWithType,
    pub filter_policy: u8,
    pub tx_power: i8,
    pub primary_phy: LePhy,
    pub secondary_max_skip: u8,
    pub secondary_phy: LePhy,
    pub sid: u8,
    pub scan_request_notification_enable: bool,
}

/// Issues the LE extended advertising commands to the controller.
pub trait AdvertiserHciInterface {
    /// LE Read Number of Supported Advertising Sets
    fn read_instance_count(&self) -> LocalBoxFuture<'static, u8>;

    /// Whether the controller disables sets whose duration or event budget
    /// runs out and reports it with an advertising-set-terminated event. If
    /// not, the host has to time the duration itself.
    fn controller_handles_timeout(&self) -> bool;

    /// Resolves with the status and the TX power selected by the controller.
    fn set_parameters(
        &self,
        handle: AdvertisingHandle,
        params: ExtendedAdvertisingParameters,
    ) -> LocalBoxFuture<'static, (ErrorCode, i8)>;

    fn set_random_address(
        &self,
        handle: AdvertisingHandle,
        address: RawAddress,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    fn set_advertising_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        fragment_preference: u8,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    fn set_scan_response_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        fragment_preference: u8,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    /// Enables or disables every set in `sets` with a single command.
    fn enable(&self, enable: bool, sets: Vec<EnableSet>) -> LocalBoxFuture<'static, ErrorCode>;

    fn set_periodic_advertising_parameters(
        &self,
        handle: AdvertisingHandle,
        params: PeriodicAdvertisingParameters,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    fn set_periodic_advertising_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    fn set_periodic_advertising_enable(
        &self,
        enable: bool,
        handle: AdvertisingHandle,
    ) -> LocalBoxFuture<'static, ErrorCode>;

    fn remove_advertising_set(&self, handle: AdvertisingHandle)
        -> LocalBoxFuture<'static, ErrorCode>;
}

/// Receives controller-initiated advertising events.
pub trait AdvertisingEventObserver {
    /// LE Advertising Set Terminated: the set stopped because its budget ran
    /// out or a connection was created from it.
    fn on_advertising_set_terminated(
        &self,
        status: ErrorCode,
        handle: AdvertisingHandle,
        connection_handle: u16,
        num_completed_extended_adv_events: u8,
    );
}
