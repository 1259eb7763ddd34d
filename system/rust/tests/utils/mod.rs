#![allow(dead_code)]

use std::future::Future;
use std::rc::Rc;

use bluetooth_le_advertising::{
    advertising::{
        hci::EnableSet,
        manager::AdvertisingSetManager,
        mocks::{
            mock_hci::{HciCommand, MockAdvertiserHci, MockHciEvent},
            mock_rpa::MockRpaGenerator,
        },
        status::{AdvertisingStatus, ErrorCode},
        AdvertiserId, StatusCallback, TimeoutCallback,
    },
    config::AdvertiserConfig,
    core::address::RawAddress,
};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
    task::{yield_now, LocalSet},
};

pub fn start_test(f: impl Future<Output = ()>) {
    tokio_test::block_on(async move {
        bt_common::init_logging();
        LocalSet::new().run_until(f).await;
    });
}

pub const LOCAL_ADDRESS: RawAddress = RawAddress { address: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66] };

pub struct TestManager {
    pub manager: AdvertisingSetManager,
    pub hci_rx: UnboundedReceiver<MockHciEvent>,
    pub rpa: Rc<MockRpaGenerator>,
}

pub async fn create_manager(
    instance_count: u8,
    controller_handles_timeout: bool,
    config: AdvertiserConfig,
) -> TestManager {
    let (hci, hci_rx) = MockAdvertiserHci::new(instance_count, controller_handles_timeout);
    let rpa = Rc::new(MockRpaGenerator::new());
    let manager =
        AdvertisingSetManager::initialize(Rc::new(hci), rpa.clone(), LOCAL_ADDRESS, config).await;
    TestManager { manager, hci_rx, rpa }
}

/// Lets the spawned sequences run until they block.
pub async fn settle() {
    for _ in 0..16 {
        yield_now().await;
    }
}

pub async fn next_event(rx: &mut UnboundedReceiver<MockHciEvent>) -> MockHciEvent {
    rx.recv().await.unwrap()
}

/// Completes the next command with `status` and returns it.
pub async fn complete_next(
    rx: &mut UnboundedReceiver<MockHciEvent>,
    status: ErrorCode,
) -> HciCommand {
    let event = next_event(rx).await;
    let command = event.command.clone();
    event.complete(status);
    command
}

/// Completes every command until an enable, which is completed too. Returns
/// all of them.
pub async fn complete_until_enable(rx: &mut UnboundedReceiver<MockHciEvent>) -> Vec<HciCommand> {
    let mut commands = vec![];
    loop {
        let command = complete_next(rx, ErrorCode::SUCCESS).await;
        let done = matches!(command, HciCommand::Enable(true, _));
        commands.push(command);
        if done {
            return commands;
        }
    }
}

/// The commands issued so far, left uncompleted.
pub async fn drain(rx: &mut UnboundedReceiver<MockHciEvent>) -> Vec<HciCommand> {
    settle().await;
    let mut commands = vec![];
    while let Ok(event) = rx.try_recv() {
        commands.push(event.command);
    }
    commands
}

pub fn status_callback() -> (StatusCallback, UnboundedReceiver<AdvertisingStatus>) {
    let (tx, rx) = unbounded_channel();
    (
        Box::new(move |status| {
            let _ = tx.send(status);
        }),
        rx,
    )
}

pub fn timeout_callback() -> (TimeoutCallback, UnboundedReceiver<AdvertisingStatus>) {
    status_callback()
}

pub async fn register(manager: &AdvertisingSetManager) -> AdvertiserId {
    let (tx, mut rx) = unbounded_channel();
    manager.register_advertiser(Box::new(move |id, status| {
        let _ = tx.send((id, status));
    }));
    let (id, status) = rx.recv().await.unwrap();
    assert_eq!(status, AdvertisingStatus::Success);
    id
}

pub fn enable_set(handle: AdvertiserId, duration: u16, max_events: u8) -> EnableSet {
    EnableSet { handle, duration, max_extended_advertising_events: max_events }
}
