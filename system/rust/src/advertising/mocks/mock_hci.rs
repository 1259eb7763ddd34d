//! Mocked implementation of AdvertiserHciInterface for use in test

use futures::future::{pending, LocalBoxFuture};
use log::info;
use tokio::sync::{
    mpsc::{self, unbounded_channel, UnboundedReceiver},
    oneshot,
};

use crate::{
    advertising::{
        hci::{
            AdvertiserHciInterface, AdvertisingHandle, EnableSet, ExtendedAdvertisingParameters,
            FragmentOperation,
        },
        params::PeriodicAdvertisingParameters,
        status::ErrorCode,
    },
    core::address::RawAddress,
};

/// A command received by the mocked controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HciCommand {
    SetParameters(AdvertisingHandle, ExtendedAdvertisingParameters),
    SetRandomAddress(AdvertisingHandle, RawAddress),
    SetAdvertisingData(AdvertisingHandle, FragmentOperation, u8, Vec<u8>),
    SetScanResponseData(AdvertisingHandle, FragmentOperation, u8, Vec<u8>),
    Enable(bool, Vec<EnableSet>),
    SetPeriodicAdvertisingParameters(AdvertisingHandle, PeriodicAdvertisingParameters),
    SetPeriodicAdvertisingData(AdvertisingHandle, FragmentOperation, Vec<u8>),
    SetPeriodicAdvertisingEnable(bool, AdvertisingHandle),
    RemoveAdvertisingSet(AdvertisingHandle),
}

#[derive(Debug)]
enum Completion {
    Status(oneshot::Sender<ErrorCode>),
    Parameters(oneshot::Sender<(ErrorCode, i8)>),
}

/// A call to AdvertiserHciInterface. Its completion is reported through
/// [`MockHciEvent::complete`]; a command that is dropped never completes.
#[derive(Debug)]
pub struct MockHciEvent {
    /// The command issued
    pub command: HciCommand,
    completion: Completion,
}

impl MockHciEvent {
    /// Completes the command. Set Parameters reports the requested TX power
    /// as the selected one.
    pub fn complete(self, status: ErrorCode) {
        let tx_power = match &self.command {
            HciCommand::SetParameters(_, params) => params.tx_power,
            _ => 0,
        };
        self.complete_with_tx_power(status, tx_power);
    }

    /// Completes the command, reporting `tx_power` if it is a Set Parameters.
    pub fn complete_with_tx_power(self, status: ErrorCode, tx_power: i8) {
        // The issuer may not wait for the completion.
        match self.completion {
            Completion::Status(tx) => {
                let _ = tx.send(status);
            }
            Completion::Parameters(tx) => {
                let _ = tx.send((status, tx_power));
            }
        }
    }
}

/// Routes calls to AdvertiserHciInterface into a channel of MockHciEvents
pub struct MockAdvertiserHci {
    tx: mpsc::UnboundedSender<MockHciEvent>,
    instance_count: u8,
    controller_handles_timeout: bool,
}

impl MockAdvertiserHci {
    /// Constructor. Returns self and the RX side of the associated channel.
    pub fn new(
        instance_count: u8,
        controller_handles_timeout: bool,
    ) -> (Self, UnboundedReceiver<MockHciEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx, instance_count, controller_handles_timeout }, rx)
    }

    fn send<T: 'static>(
        &self,
        command: HciCommand,
        completion: impl FnOnce(oneshot::Sender<T>) -> Completion,
    ) -> LocalBoxFuture<'static, T> {
        let (tx, rx) = oneshot::channel();
        info!("mock controller received {:?}", command);
        let _ = self.tx.send(MockHciEvent { command, completion: completion(tx) });
        Box::pin(async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => pending().await,
            }
        })
    }

    fn send_status(&self, command: HciCommand) -> LocalBoxFuture<'static, ErrorCode> {
        self.send(command, Completion::Status)
    }
}

impl AdvertiserHciInterface for MockAdvertiserHci {
    fn read_instance_count(&self) -> LocalBoxFuture<'static, u8> {
        let count = self.instance_count;
        Box::pin(async move { count })
    }

    fn controller_handles_timeout(&self) -> bool {
        self.controller_handles_timeout
    }

    fn set_parameters(
        &self,
        handle: AdvertisingHandle,
        params: ExtendedAdvertisingParameters,
    ) -> LocalBoxFuture<'static, (ErrorCode, i8)> {
        self.send(HciCommand::SetParameters(handle, params), Completion::Parameters)
    }

    fn set_random_address(
        &self,
        handle: AdvertisingHandle,
        address: RawAddress,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetRandomAddress(handle, address))
    }

    fn set_advertising_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        fragment_preference: u8,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetAdvertisingData(
            handle,
            operation,
            fragment_preference,
            data,
        ))
    }

    fn set_scan_response_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        fragment_preference: u8,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetScanResponseData(
            handle,
            operation,
            fragment_preference,
            data,
        ))
    }

    fn enable(&self, enable: bool, sets: Vec<EnableSet>) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::Enable(enable, sets))
    }

    fn set_periodic_advertising_parameters(
        &self,
        handle: AdvertisingHandle,
        params: PeriodicAdvertisingParameters,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetPeriodicAdvertisingParameters(handle, params))
    }

    fn set_periodic_advertising_data(
        &self,
        handle: AdvertisingHandle,
        operation: FragmentOperation,
        data: Vec<u8>,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetPeriodicAdvertisingData(handle, operation, data))
    }

    fn set_periodic_advertising_enable(
        &self,
        enable: bool,
        handle: AdvertisingHandle,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::SetPeriodicAdvertisingEnable(enable, handle))
    }

    fn remove_advertising_set(
        &self,
        handle: AdvertisingHandle,
    ) -> LocalBoxFuture<'static, ErrorCode> {
        self.send_status(HciCommand::RemoveAdvertisingSet(handle))
    }
}
