//! Hands out the controller's advertising sets and runs their command
//! sequences.
//!
//! The manager lives on a single `LocalSet`: every operation either completes
//! synchronously or spawns a local task, and HCI completions resume those
//! tasks on the same thread. Operations must therefore be called from within
//! a `LocalSet`.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, error, info, warn};
use tokio::task::spawn_local;
use tokio::time::Instant;

use crate::config::AdvertiserConfig;
use crate::core::address::{AddressType, AddressWithType, RawAddress};

use super::{
    chain::{self, Chain, ChainAbort, StartSetRequest},
    hci::{AdvertiserHciInterface, AdvertisingEventObserver, AdvertisingHandle, EnableSet},
    instance::{Exhausted, InstancePool, InstanceSnapshot},
    params::{AdvertiseParameters, PeriodicAdvertisingParameters},
    rpa::RpaGenerator,
    status::{AdvertisingStatus, ErrorCode},
    AdvertiserId, IdTxPowerStatusCallback, OwnAddressCallback, ParametersCallback,
    RegisterCallback, SetTimeoutCallback, StatusCallback, TimeoutCallback,
    INVALID_ADVERTISER_ID,
};

/// State shared between the manager and its running sequences.
pub(crate) struct ManagerInner {
    pub(crate) hci: Rc<dyn AdvertiserHciInterface>,
    pub(crate) rpa_generator: Rc<dyn RpaGenerator>,
    pub(crate) local_address: RawAddress,
    pub(crate) config: AdvertiserConfig,
    pub(crate) pool: RefCell<InstancePool>,
}

impl ManagerInner {
    /// Takes the set back from its user. The cleanup commands are not waited
    /// for and their result is ignored.
    pub(crate) fn unregister(&self, id: AdvertiserId) -> AdvertisingStatus {
        debug!("unregister: advertiser_id = {}", id);
        let mut pool = self.pool.borrow_mut();
        let inst = match pool.get_in_use_mut(id) {
            Some(inst) => inst,
            None => {
                error!("Invalid or not active advertiser id {}", id);
                return AdvertisingStatus::Failure;
            }
        };

        if inst.enable_status {
            inst.enable_status = false;
            drop(self.hci.enable(
                false,
                vec![EnableSet { handle: id, duration: 0, max_extended_advertising_events: 0 }],
            ));
        }

        if inst.periodic_enabled {
            inst.periodic_enabled = false;
            drop(self.hci.set_periodic_advertising_enable(false, id));
        }

        drop(self.hci.remove_advertising_set(id));
        inst.release();
        AdvertisingStatus::Success
    }
}

/// Allocates the first free set. Without privacy it advertises from the
/// public address right away; otherwise its address is still to be acquired.
fn allocate(manager: &Rc<ManagerInner>) -> Option<Chain> {
    let mut pool = manager.pool.borrow_mut();
    let id = pool.allocate()?;
    let inst = pool.get_mut(id)?;
    inst.own_address =
        AddressWithType { address: manager.local_address, address_type: AddressType::Public };
    Some(Chain::new(manager, id, inst.generation))
}

/// Manages the LE advertising sets of one controller.
pub struct AdvertisingSetManager {
    inner: Rc<ManagerInner>,
}

impl AdvertisingSetManager {
    /// Reads the number of advertising sets of the controller and builds the
    /// manager around them.
    pub async fn initialize(
        hci: Rc<dyn AdvertiserHciInterface>,
        rpa_generator: Rc<dyn RpaGenerator>,
        local_address: RawAddress,
        config: AdvertiserConfig,
    ) -> Self {
        let count = hci.read_instance_count().await;
        info!("Controller supports {} advertising sets", count);

        let inner = Rc::new(ManagerInner {
            hci,
            rpa_generator,
            local_address,
            config,
            pool: RefCell::new(InstancePool::new(count)),
        });

        if inner.config.reserve_zero_handle {
            // Handle 0 is taken for good and never configured.
            match allocate(&inner) {
                Some(chain) => info!("Reserved advertising set {}", chain.id()),
                None => warn!("No advertising set to reserve"),
            }
        }

        AdvertisingSetManager { inner }
    }

    fn chain_for(&self, id: AdvertiserId) -> Option<Chain> {
        let pool = self.inner.pool.borrow();
        match pool.get(id) {
            Some(inst) if inst.in_use => Some(Chain::new(&self.inner, id, inst.generation)),
            _ => {
                error!("Invalid or not active advertiser id {}", id);
                None
            }
        }
    }

    /// Allocates a set. `cb` receives its id, or `TooManyAdvertisers` right
    /// away when every set is taken.
    pub fn register_advertiser(&self, cb: RegisterCallback) {
        let chain = match allocate(&self.inner) {
            Some(chain) => chain,
            None => {
                info!("No free advertiser instance");
                cb(INVALID_ADVERTISER_ID, AdvertisingStatus::TooManyAdvertisers);
                return;
            }
        };
        let id = chain.id();
        debug!("register_advertiser: advertiser_id = {}", id);

        if !self.inner.config.privacy_enabled {
            cb(id, AdvertisingStatus::Success);
            return;
        }

        spawn_local(async move {
            match chain::acquire_address(&chain).await {
                Ok(()) => cb(id, AdvertisingStatus::Success),
                Err(abort) => {
                    if let Some(status) = abort.status() {
                        cb(INVALID_ADVERTISER_ID, status);
                    }
                }
            }
        });
    }

    /// Releases a set. Returns `Failure` if `id` was not registered.
    pub fn unregister(&self, id: AdvertiserId) -> AdvertisingStatus {
        self.inner.unregister(id)
    }

    /// Changes the parameters of a set. `cb` also receives the TX power the
    /// controller picked.
    pub fn set_parameters(
        &self,
        id: AdvertiserId,
        params: AdvertiseParameters,
        cb: ParametersCallback,
    ) {
        let chain = match self.chain_for(id) {
            Some(chain) => chain,
            None => return cb(AdvertisingStatus::Failure, 0),
        };

        spawn_local(async move {
            match chain::set_parameters(&chain, params).await {
                Ok(tx_power) => cb(AdvertisingStatus::Success, tx_power),
                Err(abort) => {
                    if let Some(status) = abort.status() {
                        cb(status, 0);
                    }
                }
            }
        });
    }

    /// Replaces the advertising data, or the scan response data, of a set.
    pub fn set_data(&self, id: AdvertiserId, is_scan_rsp: bool, data: Vec<u8>, cb: StatusCallback) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::set_data(&set, is_scan_rsp, data, None).await
        });
    }

    /// Starts or stops a set. A non-zero `duration` (10 ms units) or
    /// `max_ext_adv_events` bounds the run; `timeout_cb` is then invoked once
    /// when the bound is hit.
    pub fn enable(
        &self,
        id: AdvertiserId,
        enable: bool,
        duration: u16,
        max_ext_adv_events: u8,
        timeout_cb: Option<TimeoutCallback>,
        cb: StatusCallback,
    ) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::enable(&set, enable, duration, max_ext_adv_events, timeout_cb).await
        });
    }

    /// Configures a registered set and starts it.
    pub fn start_advertising(
        &self,
        id: AdvertiserId,
        params: AdvertiseParameters,
        advertise_data: Vec<u8>,
        scan_response_data: Vec<u8>,
        duration: u16,
        timeout_cb: TimeoutCallback,
        cb: StatusCallback,
    ) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::start_advertising(
                &set,
                params,
                advertise_data,
                scan_response_data,
                duration,
                timeout_cb,
            )
            .await
        });
    }

    /// Registers a set, configures it, sets up its periodic advertising if
    /// `periodic_params.enable`, and starts it. On any failure the set is
    /// released again.
    pub fn start_advertising_set(
        &self,
        params: AdvertiseParameters,
        advertise_data: Vec<u8>,
        scan_response_data: Vec<u8>,
        periodic_params: PeriodicAdvertisingParameters,
        periodic_data: Vec<u8>,
        duration: u16,
        max_ext_adv_events: u8,
        timeout_cb: SetTimeoutCallback,
        cb: IdTxPowerStatusCallback,
    ) {
        let chain = match allocate(&self.inner) {
            Some(chain) => chain,
            None => {
                info!("No free advertiser instance");
                cb(INVALID_ADVERTISER_ID, 0, AdvertisingStatus::TooManyAdvertisers);
                return;
            }
        };
        let id = chain.id();
        debug!("start_advertising_set: advertiser_id = {}", id);

        let req = StartSetRequest {
            acquire_address: self.inner.config.privacy_enabled,
            params,
            advertise_data,
            scan_response_data,
            periodic_params,
            periodic_data,
            duration,
            max_ext_adv_events,
            timeout_cb: Box::new(move |status| timeout_cb(id, status)),
        };

        spawn_local(async move {
            match chain::start_advertising_set(&chain, req).await {
                Ok(tx_power) => cb(id, tx_power, AdvertisingStatus::Success),
                Err(ChainAbort::ShutDown) => (),
                Err(abort) => {
                    chain.unregister();
                    let status = abort.status().unwrap_or(AdvertisingStatus::Failure);
                    cb(INVALID_ADVERTISER_ID, 0, status);
                }
            }
        });
    }

    /// Sets the periodic advertising parameters of a set.
    pub fn set_periodic_advertising_parameters(
        &self,
        id: AdvertiserId,
        params: PeriodicAdvertisingParameters,
        cb: StatusCallback,
    ) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::set_periodic_parameters(&set, params).await
        });
    }

    /// Replaces the periodic advertising data of a set.
    pub fn set_periodic_advertising_data(
        &self,
        id: AdvertiserId,
        data: Vec<u8>,
        cb: StatusCallback,
    ) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::set_periodic_data(&set, data).await
        });
    }

    /// Starts or stops the periodic advertising of a set.
    pub fn set_periodic_advertising_enable(
        &self,
        id: AdvertiserId,
        enable: bool,
        cb: StatusCallback,
    ) {
        self.run_status_chain(id, cb, move |set| async move {
            chain::set_periodic_enable(&set, enable).await
        });
    }

    fn run_status_chain<F, Fut>(&self, id: AdvertiserId, cb: StatusCallback, run: F)
    where
        F: FnOnce(Chain) -> Fut,
        Fut: std::future::Future<Output = chain::ChainResult<()>> + 'static,
    {
        let chain = match self.chain_for(id) {
            Some(chain) => chain,
            None => return cb(AdvertisingStatus::Failure),
        };

        let sequence = run(chain);
        spawn_local(async move {
            match sequence.await {
                Ok(()) => cb(AdvertisingStatus::Success),
                Err(abort) => {
                    if let Some(status) = abort.status() {
                        cb(status);
                    }
                }
            }
        });
    }

    /// Stops every running set with one command, remembering what is left of
    /// their budgets so that [`Self::resume`] can restart them.
    pub fn suspend(&self) {
        let now = Instant::now();
        let mut expired = vec![];
        let mut sets = vec![];

        {
            let mut pool = self.inner.pool.borrow_mut();
            for inst in pool.iter_mut().filter(|inst| inst.in_use && inst.enable_status) {
                inst.cancel_duration_timer();
                if inst.has_timeout() {
                    if let Some(exhausted) = inst.recompute_timeout(now) {
                        expired.push(exhausted);
                    }
                }
                sets.push(EnableSet {
                    handle: inst.id(),
                    duration: 0,
                    max_extended_advertising_events: 0,
                });
            }
        }

        debug!("suspend: {} advertising sets", sets.len());
        if !sets.is_empty() {
            drop(self.inner.hci.enable(false, sets));
        }
        notify_timeouts(expired);
    }

    /// Restarts the sets stopped by [`Self::suspend`] with one command.
    pub fn resume(&self) {
        let mut sets = vec![];

        {
            let mut pool = self.inner.pool.borrow_mut();
            for inst in pool.iter_mut().filter(|inst| inst.in_use && inst.enable_status) {
                inst.enable_time = Instant::now();
                sets.push(inst.enable_set());
            }
        }

        debug!("resume: {} advertising sets", sets.len());
        if sets.is_empty() {
            return;
        }

        let pending = self.inner.hci.enable(true, sets.clone());
        let timed: Vec<Chain> = sets
            .iter()
            .filter(|set| set.duration != 0)
            .filter_map(|set| self.chain_for(set.handle))
            .collect();
        if timed.is_empty() || self.inner.hci.controller_handles_timeout() {
            drop(pending);
            return;
        }

        // The host times the duration itself: restart the timers once the
        // sets are running again.
        spawn_local(async move {
            if !pending.await.is_success() {
                error!("Failed to resume advertising");
                return;
            }
            for set in timed {
                let _ = chain::arm_duration_timer(&set);
            }
        });
    }

    /// Delivers the address set `id` advertises with.
    pub fn get_own_address(&self, id: AdvertiserId, cb: OwnAddressCallback) {
        let address = self
            .inner
            .pool
            .borrow()
            .get(id)
            .filter(|inst| inst.in_use)
            .map(|inst| inst.own_address);
        if address.is_none() {
            error!("Invalid or not active advertiser id {}", id);
        }
        cb(address);
    }

    /// Number of advertising sets of the controller.
    pub fn instance_count(&self) -> usize {
        self.inner.pool.borrow().len()
    }

    /// Whether set `id` is registered and was last commanded to advertise.
    pub fn is_enabled(&self, id: AdvertiserId) -> bool {
        self.inner.pool.borrow().get(id).map_or(false, |inst| inst.in_use && inst.enable_status)
    }

    /// A copy of the state of set `id`.
    pub fn instance(&self, id: AdvertiserId) -> Option<InstanceSnapshot> {
        self.inner.pool.borrow().get(id).map(|inst| inst.snapshot())
    }
}

fn notify_timeouts(expired: Vec<Exhausted>) {
    for Exhausted { status, timeout_cb } in expired {
        match timeout_cb {
            Some(timeout_cb) => timeout_cb(status),
            None => info!("No timeout callback"),
        }
    }
}

impl AdvertisingEventObserver for AdvertisingSetManager {
    fn on_advertising_set_terminated(
        &self,
        status: ErrorCode,
        handle: AdvertisingHandle,
        connection_handle: u16,
        num_completed_extended_adv_events: u8,
    ) {
        debug!(
            "on_advertising_set_terminated: status={:?}, handle={}, conn={:#06x}, events={}",
            status, handle, connection_handle, num_completed_extended_adv_events
        );

        let mut expired = vec![];
        {
            let mut pool = self.inner.pool.borrow_mut();
            let inst = match pool.get_mut(handle) {
                Some(inst) => inst,
                None => {
                    error!("Unknown advertising handle {}", handle);
                    return;
                }
            };

            if status == ErrorCode::LIMIT_REACHED || status == ErrorCode::ADVERTISING_TIMEOUT {
                // Either the duration elapsed or max_ext_adv_events was reached.
                inst.enable_status = false;
                inst.cancel_duration_timer();
                expired
                    .push(Exhausted { status: status.into(), timeout_cb: inst.timeout_cb.take() });
            } else if inst.in_use && inst.is_directed() {
                // Directed advertising is one-shot, it is not restarted.
                inst.release();
            } else if inst.in_use {
                let now = Instant::now();
                if let Some(exhausted) = inst.recompute_timeout(now) {
                    expired.push(exhausted);
                }
                if inst.enable_status {
                    debug!("Re-enabling advertising set {}", handle);
                    inst.enable_time = now;
                    drop(self.inner.hci.enable(true, vec![inst.enable_set()]));
                }
            }
        }

        notify_timeouts(expired);
    }
}

impl Drop for AdvertisingSetManager {
    fn drop(&mut self) {
        if let Ok(mut pool) = self.inner.pool.try_borrow_mut() {
            for inst in pool.iter_mut() {
                inst.cancel_timers();
            }
        }
    }
}
