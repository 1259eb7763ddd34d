//! The command sequences run against a single advertising set.
//!
//! Each sequence is an async task on the local set. It holds only a weak
//! reference to the manager and re-checks, after every command completes,
//! that the manager is still alive and the set was not released meanwhile.

use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::LocalBoxFuture;
use log::{debug, error, info, warn};
use tokio::task::{spawn_local, JoinHandle};
use tokio::time::{interval_at, sleep, Instant};

use crate::core::address::AddressType;

use super::{
    ad_data::{patch_tx_power, prepend_flags},
    fragment::fragments,
    hci::{EnableSet, ExtendedAdvertisingParameters, FRAGMENT_PREFERENCE_SHOULD_NOT_FRAGMENT},
    instance::AdvertisingInstance,
    manager::ManagerInner,
    params::{AdvertiseParameters, PeriodicAdvertisingParameters},
    status::{AdvertisingStatus, ErrorCode},
    AdvertiserId, TimeoutCallback,
};

// Own SID of every set.
const ADVERTISING_SID: u8 = 0x01;

/// Why a sequence stopped early.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChainAbort {
    /// The manager is gone. Nothing may be touched, nobody is told.
    ShutDown,
    /// The set was released (and maybe handed out again) under the sequence.
    Released,
    /// A command failed with this status.
    Failed(AdvertisingStatus),
}

impl ChainAbort {
    /// The status to report to the caller, if any.
    pub(crate) fn status(self) -> Option<AdvertisingStatus> {
        match self {
            ChainAbort::ShutDown => None,
            ChainAbort::Released => Some(AdvertisingStatus::Failure),
            ChainAbort::Failed(status) => Some(status),
        }
    }
}

pub(crate) type ChainResult<T> = Result<T, ChainAbort>;

fn check(status: ErrorCode, what: &str) -> ChainResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        error!("{} failed, status: {:#04x}", what, status.0);
        Err(ChainAbort::Failed(status.into()))
    }
}

/// A revocable handle on one allocation of an advertising set.
#[derive(Clone)]
pub(crate) struct Chain {
    manager: Weak<ManagerInner>,
    id: AdvertiserId,
    generation: u64,
}

impl Chain {
    pub(crate) fn new(manager: &Rc<ManagerInner>, id: AdvertiserId, generation: u64) -> Self {
        Chain { manager: Rc::downgrade(manager), id, generation }
    }

    pub(crate) fn id(&self) -> AdvertiserId {
        self.id
    }

    /// Runs `f` on the set, if it is still ours. The state is only borrowed
    /// for the duration of `f`.
    pub(crate) fn with<R>(
        &self,
        f: impl FnOnce(&Rc<ManagerInner>, &mut AdvertisingInstance) -> R,
    ) -> ChainResult<R> {
        let manager = match self.manager.upgrade() {
            Some(manager) => manager,
            None => {
                info!("Stack was shut down");
                return Err(ChainAbort::ShutDown);
            }
        };
        let mut pool = manager.pool.borrow_mut();
        match pool.get_in_use_mut(self.id) {
            Some(inst) if inst.generation == self.generation => Ok(f(&manager, inst)),
            _ => {
                warn!("advertising set {} was released", self.id);
                Err(ChainAbort::Released)
            }
        }
    }

    /// Waits for a command issued earlier, then checks the set is still ours.
    pub(crate) async fn wait<T>(&self, pending: LocalBoxFuture<'static, T>) -> ChainResult<T> {
        let result = pending.await;
        self.with(|_, _| ())?;
        Ok(result)
    }

    /// Issues the command built by `f` and waits for its completion.
    pub(crate) async fn command<T>(
        &self,
        f: impl FnOnce(&Rc<ManagerInner>, &mut AdvertisingInstance) -> LocalBoxFuture<'static, T>,
    ) -> ChainResult<T> {
        let pending = self.with(f)?;
        self.wait(pending).await
    }

    /// Unregisters the set, unless it was already released.
    pub(crate) fn unregister(&self) {
        if let Some(manager) = self.manager.upgrade() {
            let ours = manager
                .pool
                .borrow()
                .get(self.id)
                .map_or(false, |inst| inst.in_use && inst.generation == self.generation);
            if ours {
                manager.unregister(self.id);
            }
        }
    }
}

/// Gives a freshly registered set a resolvable private address and starts
/// rotating it.
pub(crate) async fn acquire_address(chain: &Chain) -> ChainResult<()> {
    let generator = chain.with(|manager, inst| {
        inst.own_address.address_type = AddressType::Random;
        manager.rpa_generator.clone()
    })?;
    let address = generator.generate_rpa().await;

    chain.with(|manager, inst| {
        inst.own_address.address = address;
        inst.rotation_timer =
            Some(start_rotation_timer(manager.config.rpa_rotation_interval, chain.clone()));
    })
}

fn start_rotation_timer(period: Duration, chain: Chain) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    spawn_local(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        loop {
            ticks.tick().await;
            debug!("rotating address of advertising set {}", chain.id);
            match configure_rpa(&chain).await {
                Err(ChainAbort::ShutDown) | Err(ChainAbort::Released) => return,
                _ => (),
            }
        }
    })
}

/// Moves the set to a new resolvable private address.
///
/// A connectable set has to be stopped for that. When it runs with a
/// duration or event limit it cannot simply be restarted, so the rotation
/// is postponed to the next enable instead.
pub(crate) async fn configure_rpa(chain: &Chain) -> ChainResult<()> {
    let must_defer = |inst: &mut AdvertisingInstance| {
        let defer = inst.enable_status && inst.is_connectable() && inst.has_timeout();
        if defer {
            debug!("deferring address rotation of advertising set {}", inst.id());
            inst.address_update_required = true;
        }
        defer
    };

    let generator = chain.with(|manager, inst| {
        if must_defer(inst) {
            None
        } else {
            Some(manager.rpa_generator.clone())
        }
    })?;
    let generator = match generator {
        Some(generator) => generator,
        None => return Ok(()),
    };
    let address = generator.generate_rpa().await;

    let pending = chain.with(|manager, inst| {
        if must_defer(inst) {
            return None;
        }

        let restart = inst.enable_status && inst.is_connectable();
        if restart {
            inst.enable_status = false;
            drop(manager.hci.enable(
                false,
                vec![EnableSet {
                    handle: inst.id(),
                    duration: 0,
                    max_extended_advertising_events: 0,
                }],
            ));
        }

        let pending = manager.hci.set_random_address(inst.id(), address);

        if restart {
            inst.enable_status = true;
            inst.enable_time = Instant::now();
            drop(manager.hci.enable(true, vec![inst.enable_set()]));
        }
        Some(pending)
    })?;
    let pending = match pending {
        Some(pending) => pending,
        None => return Ok(()),
    };

    let status = chain.wait(pending).await?;
    check(status, "setting random address")?;
    chain.with(|_, inst| inst.own_address.address = address)
}

/// Sends the parameters; resolves with the TX power picked by the controller.
pub(crate) async fn set_parameters(chain: &Chain, params: AdvertiseParameters) -> ChainResult<i8> {
    debug!("set_parameters: advertiser_id = {}", chain.id);
    let (status, tx_power) = chain
        .command(|manager, inst| {
            manager.hci.set_parameters(
                inst.id(),
                ExtendedAdvertisingParameters {
                    event_properties: params.event_properties,
                    min_interval: params.min_interval,
                    max_interval: params.max_interval,
                    channel_map: params.channel_map,
                    own_address_type: inst.own_address.address_type,
                    own_address: inst.own_address.address,
                    peer_address: Default::default(),
                    filter_policy: params.filter_policy,
                    tx_power: params.tx_power,
                    primary_phy: params.primary_phy,
                    secondary_max_skip: 0,
                    secondary_phy: params.secondary_phy,
                    sid: ADVERTISING_SID,
                    scan_request_notification_enable: params.scan_request_notification_enable,
                },
            )
        })
        .await?;
    check(status, "setting parameters")?;

    chain.with(|_, inst| {
        inst.event_properties = params.event_properties;
        inst.tx_power = tx_power;
        inst.advertising_interval = params.min_interval;
    })?;
    Ok(tx_power)
}

/// Programs the set's own address into the controller, for random addresses.
pub(crate) async fn set_random_address(chain: &Chain) -> ChainResult<()> {
    let own_address = chain.with(|_, inst| inst.own_address)?;
    if own_address.address_type != AddressType::Random {
        return Ok(());
    }

    debug!("set_random_address: advertiser_id = {}", chain.id);
    let status = chain
        .command(|manager, inst| manager.hci.set_random_address(inst.id(), own_address.address))
        .await?;
    check(status, "setting random address")
}

#[derive(Copy, Clone, Debug)]
enum DataKind {
    Advertising,
    ScanResponse,
    Periodic,
}

async fn send_fragmented(chain: &Chain, kind: DataKind, data: Vec<u8>) -> ChainResult<()> {
    for (operation, fragment) in fragments(&data) {
        let fragment = fragment.to_vec();
        let status = chain
            .command(|manager, inst| match kind {
                DataKind::Advertising => manager.hci.set_advertising_data(
                    inst.id(),
                    operation,
                    FRAGMENT_PREFERENCE_SHOULD_NOT_FRAGMENT,
                    fragment,
                ),
                DataKind::ScanResponse => manager.hci.set_scan_response_data(
                    inst.id(),
                    operation,
                    FRAGMENT_PREFERENCE_SHOULD_NOT_FRAGMENT,
                    fragment,
                ),
                DataKind::Periodic => {
                    manager.hci.set_periodic_advertising_data(inst.id(), operation, fragment)
                }
            })
            .await?;
        check(status, &format!("setting {:?} data", kind))?;
    }
    Ok(())
}

/// Uploads advertising or scan response data.
///
/// `duration` is the duration the set is about to be enabled with, when that
/// differs from the one it last ran with. It decides the discoverable mode
/// announced in the Flags.
pub(crate) async fn set_data(
    chain: &Chain,
    is_scan_rsp: bool,
    mut data: Vec<u8>,
    duration: Option<u16>,
) -> ChainResult<()> {
    debug!("set_data: advertiser_id = {}, is_scan_rsp = {}", chain.id, is_scan_rsp);
    chain.with(|_, inst| {
        if !is_scan_rsp && inst.is_connectable() {
            prepend_flags(&mut data, duration.unwrap_or(inst.duration) != 0);
        }
        patch_tx_power(&mut data, inst.tx_power);
    })?;

    let kind = if is_scan_rsp { DataKind::ScanResponse } else { DataKind::Advertising };
    send_fragmented(chain, kind, data).await
}

pub(crate) async fn set_periodic_parameters(
    chain: &Chain,
    params: PeriodicAdvertisingParameters,
) -> ChainResult<()> {
    debug!("set_periodic_parameters: advertiser_id = {}", chain.id);
    let status = chain
        .command(|manager, inst| manager.hci.set_periodic_advertising_parameters(inst.id(), params))
        .await?;
    check(status, "setting periodic parameters")
}

pub(crate) async fn set_periodic_data(chain: &Chain, data: Vec<u8>) -> ChainResult<()> {
    debug!("set_periodic_data: advertiser_id = {}", chain.id);
    send_fragmented(chain, DataKind::Periodic, data).await
}

pub(crate) async fn set_periodic_enable(chain: &Chain, enable: bool) -> ChainResult<()> {
    debug!("set_periodic_enable: advertiser_id = {}, enable = {}", chain.id, enable);
    let status = chain
        .command(|manager, inst| manager.hci.set_periodic_advertising_enable(enable, inst.id()))
        .await?;
    check(status, "enabling periodic advertising")?;
    chain.with(|_, inst| inst.periodic_enabled = enable)
}

/// The state `enable` changes before the controller has answered, put back
/// if the command fails.
struct EnableRollback {
    enable_status: bool,
    duration: u16,
    max_ext_adv_events: u8,
    enable_time: Instant,
    /// Set when `timeout_cb` was replaced.
    timeout_cb: Option<Option<TimeoutCallback>>,
}

impl EnableRollback {
    fn apply(self, inst: &mut AdvertisingInstance) {
        inst.enable_status = self.enable_status;
        inst.duration = self.duration;
        inst.max_ext_adv_events = self.max_ext_adv_events;
        inst.enable_time = self.enable_time;
        if let Some(timeout_cb) = self.timeout_cb {
            inst.timeout_cb = timeout_cb;
        }
    }
}

/// Enables or disables the set.
///
/// On enable, `timeout_cb` is kept if the set runs with a limit, and an
/// address rotation postponed earlier is done first. If the controller
/// rejects the command the set is left as it was.
pub(crate) async fn enable(
    chain: &Chain,
    enable: bool,
    duration: u16,
    max_ext_adv_events: u8,
    timeout_cb: Option<TimeoutCallback>,
) -> ChainResult<()> {
    debug!(
        "enable: advertiser_id = {}, enable = {}, duration = {}, max_ext_adv_events = {}",
        chain.id, enable, duration, max_ext_adv_events
    );

    let (rollback, update_address) = chain.with(|_, inst| {
        let replaced_cb = if enable && (duration != 0 || max_ext_adv_events != 0) {
            Some(std::mem::replace(&mut inst.timeout_cb, timeout_cb))
        } else {
            None
        };
        let rollback = EnableRollback {
            enable_status: inst.enable_status,
            duration: inst.duration,
            max_ext_adv_events: inst.max_ext_adv_events,
            enable_time: inst.enable_time,
            timeout_cb: replaced_cb,
        };
        inst.duration = duration;
        inst.max_ext_adv_events = max_ext_adv_events;

        let update_address = enable && inst.address_update_required;
        if update_address {
            inst.address_update_required = false;
        }
        (rollback, update_address)
    })?;

    if update_address {
        match configure_rpa(chain).await {
            Err(ChainAbort::ShutDown) => return Err(ChainAbort::ShutDown),
            Err(ChainAbort::Released) => return Err(ChainAbort::Released),
            // Keep advertising from the old address.
            _ => (),
        }
    }

    let pending = chain.with(|manager, inst| {
        if enable {
            inst.enable_time = Instant::now();
        }
        inst.enable_status = enable;
        manager.hci.enable(enable, vec![inst.enable_set()])
    })?;
    let status = chain.wait(pending).await?;

    if !status.is_success() {
        chain.with(|_, inst| rollback.apply(inst))?;
        return check(status, if enable { "enabling advertiser" } else { "disabling advertiser" });
    }

    chain.with(|_, inst| inst.cancel_duration_timer())?;
    if enable {
        arm_duration_timer(chain)?;
    }
    Ok(())
}

/// Times the duration of a running set on the host, for controllers that do
/// not stop sets themselves.
pub(crate) fn arm_duration_timer(chain: &Chain) -> ChainResult<()> {
    chain.with(|manager, inst| {
        if inst.duration != 0 && !manager.hci.controller_handles_timeout() {
            inst.cancel_duration_timer();
            inst.duration_timer = Some(start_duration_timer(chain.clone(), inst.duration));
        }
    })
}

fn start_duration_timer(chain: Chain, duration: u16) -> JoinHandle<()> {
    spawn_local(async move {
        sleep(Duration::from_millis(u64::from(duration) * 10)).await;
        debug!("duration of advertising set {} elapsed", chain.id);
        if let Err(abort) = duration_elapsed(&chain).await {
            debug!("advertising set {} timeout not delivered: {:?}", chain.id, abort);
        }
    })
}

async fn duration_elapsed(chain: &Chain) -> ChainResult<()> {
    let (pending, timeout_cb) = chain.with(|manager, inst| {
        // Detached rather than aborted: this task is the timer.
        inst.duration_timer.take();
        inst.enable_status = false;
        inst.duration = 0;
        inst.max_ext_adv_events = 0;
        (manager.hci.enable(false, vec![inst.enable_set()]), inst.timeout_cb.take())
    })?;

    let status = chain.wait(pending).await?;
    if let Some(timeout_cb) = timeout_cb {
        timeout_cb(status.into());
    }
    Ok(())
}

/// Configures and enables an already registered set.
pub(crate) async fn start_advertising(
    chain: &Chain,
    params: AdvertiseParameters,
    advertise_data: Vec<u8>,
    scan_response_data: Vec<u8>,
    duration: u16,
    timeout_cb: TimeoutCallback,
) -> ChainResult<()> {
    set_parameters(chain, params).await?;
    set_random_address(chain).await?;
    set_data(chain, false, advertise_data, Some(duration)).await?;
    set_data(chain, true, scan_response_data, Some(duration)).await?;
    self::enable(chain, true, duration, 0, Some(timeout_cb)).await
}

/// Everything needed to bring up a set right after its allocation.
pub(crate) struct StartSetRequest {
    pub(crate) acquire_address: bool,
    pub(crate) params: AdvertiseParameters,
    pub(crate) advertise_data: Vec<u8>,
    pub(crate) scan_response_data: Vec<u8>,
    pub(crate) periodic_params: PeriodicAdvertisingParameters,
    pub(crate) periodic_data: Vec<u8>,
    pub(crate) duration: u16,
    pub(crate) max_ext_adv_events: u8,
    pub(crate) timeout_cb: TimeoutCallback,
}

/// Configures and enables a newly allocated set, including its periodic
/// advertising if requested. Resolves with the TX power in use.
pub(crate) async fn start_advertising_set(chain: &Chain, req: StartSetRequest) -> ChainResult<i8> {
    if req.acquire_address {
        acquire_address(chain).await?;
    }
    set_parameters(chain, req.params).await?;
    set_random_address(chain).await?;
    set_data(chain, false, req.advertise_data, Some(req.duration)).await?;
    set_data(chain, true, req.scan_response_data, Some(req.duration)).await?;

    if req.periodic_params.enable {
        set_periodic_parameters(chain, req.periodic_params).await?;
        set_periodic_data(chain, req.periodic_data).await?;
        set_periodic_enable(chain, true).await?;
    }

    self::enable(chain, true, req.duration, req.max_ext_adv_events, Some(req.timeout_cb)).await?;
    chain.with(|_, inst| inst.tx_power)
}
