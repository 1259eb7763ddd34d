//! Per-set state, and the fixed pool the sets are handed out from.

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::address::AddressWithType;

use super::{
    hci::EnableSet,
    params::AdvertisingEventProperties,
    status::{AdvertisingStatus, ErrorCode},
    AdvertiserId, TimeoutCallback,
};

/// The state of one controller advertising set.
pub struct AdvertisingInstance {
    id: AdvertiserId,
    pub(crate) in_use: bool,
    /// Last commanded state, set as soon as an enable is issued.
    pub(crate) enable_status: bool,
    pub(crate) event_properties: AdvertisingEventProperties,
    pub(crate) tx_power: i8,
    pub(crate) advertising_interval: u32,
    /// In 10 ms units, 0 for no limit.
    pub(crate) duration: u16,
    /// 0 for no limit.
    pub(crate) max_ext_adv_events: u8,
    pub(crate) own_address: AddressWithType,
    /// A rotation was skipped while the set was running with a timeout.
    pub(crate) address_update_required: bool,
    pub(crate) periodic_enabled: bool,
    pub(crate) enable_time: Instant,
    pub(crate) timeout_cb: Option<TimeoutCallback>,
    /// Bumped on every release so that a chain can tell whether the slot
    /// still belongs to it.
    pub(crate) generation: u64,
    pub(crate) rotation_timer: Option<JoinHandle<()>>,
    pub(crate) duration_timer: Option<JoinHandle<()>>,
}

/// A read-only copy of the state of an advertising set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub id: AdvertiserId,
    pub in_use: bool,
    pub enable_status: bool,
    pub event_properties: AdvertisingEventProperties,
    pub tx_power: i8,
    pub advertising_interval: u32,
    pub duration: u16,
    pub max_ext_adv_events: u8,
    pub own_address: AddressWithType,
    pub address_update_required: bool,
    pub periodic_enabled: bool,
    pub has_timeout_cb: bool,
}

/// Returned by [`AdvertisingInstance::recompute_timeout`] when the set has
/// used up its duration or event budget.
pub struct Exhausted {
    /// Why the set stopped
    pub status: AdvertisingStatus,
    /// The callback to notify, taken from the instance
    pub timeout_cb: Option<TimeoutCallback>,
}

impl AdvertisingInstance {
    pub(crate) fn new(id: AdvertiserId) -> Self {
        AdvertisingInstance {
            id,
            in_use: false,
            enable_status: false,
            event_properties: AdvertisingEventProperties::empty(),
            tx_power: 0,
            advertising_interval: 0,
            duration: 0,
            max_ext_adv_events: 0,
            own_address: AddressWithType::EMPTY,
            address_update_required: false,
            periodic_enabled: false,
            enable_time: Instant::now(),
            timeout_cb: None,
            generation: 0,
            rotation_timer: None,
            duration_timer: None,
        }
    }

    /// The id, fixed for the lifetime of the pool
    pub fn id(&self) -> AdvertiserId {
        self.id
    }

    pub(crate) fn is_connectable(&self) -> bool {
        self.event_properties.contains(AdvertisingEventProperties::CONNECTABLE)
    }

    pub(crate) fn is_directed(&self) -> bool {
        self.event_properties.is_directed()
    }

    /// Whether the set is running with a bounded duration or event count.
    pub(crate) fn has_timeout(&self) -> bool {
        self.duration != 0 || self.max_ext_adv_events != 0
    }

    pub(crate) fn enable_set(&self) -> EnableSet {
        EnableSet {
            handle: self.id,
            duration: self.duration,
            max_extended_advertising_events: self.max_ext_adv_events,
        }
    }

    pub(crate) fn cancel_timers(&mut self) {
        if let Some(timer) = self.rotation_timer.take() {
            timer.abort();
        }
        self.cancel_duration_timer();
    }

    pub(crate) fn cancel_duration_timer(&mut self) {
        if let Some(timer) = self.duration_timer.take() {
            timer.abort();
        }
    }

    /// Returns the slot to the pool. Chains started on the previous
    /// allocation observe the new generation and stop touching it.
    pub(crate) fn release(&mut self) {
        debug!("releasing advertising set {}", self.id);
        self.cancel_timers();
        let mut fresh = AdvertisingInstance::new(self.id);
        fresh.generation = self.generation.wrapping_add(1);
        *self = fresh;
    }

    /// Accounts for the time spent advertising since `enable_time` against
    /// the duration and event budgets.
    ///
    /// When one of them runs out the set is marked disabled and the timeout
    /// callback is handed back to the caller, who must invoke it once no
    /// state is borrowed any more. The status passed to it is the one the
    /// controller would have reported: `ADVERTISING_TIMEOUT` for the
    /// duration, `LIMIT_REACHED` for the event count, never `Success`.
    pub fn recompute_timeout(&mut self, now: Instant) -> Option<Exhausted> {
        let elapsed_ms = now.saturating_duration_since(self.enable_time).as_millis();

        if self.duration != 0 {
            let duration_done = elapsed_ms / 10;
            if duration_done + 1 >= self.duration as u128 {
                return Some(self.exhaust(ErrorCode::ADVERTISING_TIMEOUT));
            }
            self.duration -= duration_done as u16;
        }

        if self.max_ext_adv_events != 0 {
            let event_ms = (self.advertising_interval as u128 * 5 / 8).max(1);
            let events_done = elapsed_ms / event_ms;
            if events_done + 1 >= self.max_ext_adv_events as u128 {
                return Some(self.exhaust(ErrorCode::LIMIT_REACHED));
            }
            self.max_ext_adv_events -= events_done as u8;
        }

        None
    }

    fn exhaust(&mut self, reason: ErrorCode) -> Exhausted {
        debug!("advertising set {} exhausted its budget ({:?})", self.id, reason);
        self.enable_status = false;
        self.cancel_duration_timer();
        Exhausted { status: reason.into(), timeout_cb: self.timeout_cb.take() }
    }

    /// Copies the externally interesting state.
    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id,
            in_use: self.in_use,
            enable_status: self.enable_status,
            event_properties: self.event_properties,
            tx_power: self.tx_power,
            advertising_interval: self.advertising_interval,
            duration: self.duration,
            max_ext_adv_events: self.max_ext_adv_events,
            own_address: self.own_address,
            address_update_required: self.address_update_required,
            periodic_enabled: self.periodic_enabled,
            has_timeout_cb: self.timeout_cb.is_some(),
        }
    }
}

impl Drop for AdvertisingInstance {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

/// The advertising sets of the controller. Sized once, never resized.
pub struct InstancePool {
    instances: Vec<AdvertisingInstance>,
}

impl InstancePool {
    /// Builds `count` free sets with ids `0..count`.
    pub fn new(count: u8) -> Self {
        InstancePool { instances: (0..count).map(AdvertisingInstance::new).collect() }
    }

    /// Number of sets, free or not.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the controller has no advertising sets at all.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Marks the free set with the lowest id as used and returns its id.
    pub fn allocate(&mut self) -> Option<AdvertiserId> {
        let inst = self.instances.iter_mut().find(|inst| !inst.in_use)?;
        inst.in_use = true;
        Some(inst.id)
    }

    pub fn get(&self, id: AdvertiserId) -> Option<&AdvertisingInstance> {
        self.instances.get(id as usize)
    }

    pub fn get_mut(&mut self, id: AdvertiserId) -> Option<&mut AdvertisingInstance> {
        self.instances.get_mut(id as usize)
    }

    /// Like [`Self::get_mut`], but only for allocated sets.
    pub fn get_in_use_mut(&mut self, id: AdvertiserId) -> Option<&mut AdvertisingInstance> {
        self.get_mut(id).filter(|inst| inst.in_use)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdvertisingInstance> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AdvertisingInstance> {
        self.instances.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc, time::Duration};

    fn running_instance(duration: u16, max_events: u8, interval: u32) -> AdvertisingInstance {
        let mut inst = AdvertisingInstance::new(0);
        inst.in_use = true;
        inst.enable_status = true;
        inst.duration = duration;
        inst.max_ext_adv_events = max_events;
        inst.advertising_interval = interval;
        inst
    }

    fn record_timeouts(inst: &mut AdvertisingInstance) -> Rc<RefCell<Vec<AdvertisingStatus>>> {
        let fired = Rc::new(RefCell::new(vec![]));
        let sink = fired.clone();
        inst.timeout_cb = Some(Box::new(move |status| sink.borrow_mut().push(status)));
        fired
    }

    fn fire(exhausted: Option<Exhausted>) {
        if let Some(Exhausted { status, timeout_cb: Some(cb) }) = exhausted {
            cb(status);
        }
    }

    #[test]
    fn test_pool_allocates_first_fit() {
        let mut pool = InstancePool::new(3);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), None);

        pool.get_mut(1).unwrap().release();
        assert!(pool.get_in_use_mut(1).is_none());
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.get(1).unwrap().generation, 1);
    }

    #[test]
    fn test_release_resets_state() {
        let mut inst = running_instance(10, 5, 160);
        inst.periodic_enabled = true;
        inst.address_update_required = true;
        inst.release();

        let snapshot = inst.snapshot();
        assert_eq!(snapshot.id, 0);
        assert!(!snapshot.in_use);
        assert!(!snapshot.enable_status);
        assert!(!snapshot.periodic_enabled);
        assert!(!snapshot.address_update_required);
        assert_eq!(snapshot.duration, 0);
    }

    #[test]
    fn test_duration_exhausted() {
        let mut inst = running_instance(12, 0, 0);
        let fired = record_timeouts(&mut inst);
        let start = inst.enable_time;

        fire(inst.recompute_timeout(start + Duration::from_millis(111)));

        assert!(!inst.enable_status);
        assert_eq!(
            *fired.borrow(),
            vec![AdvertisingStatus::Controller(ErrorCode::ADVERTISING_TIMEOUT)]
        );

        // The callback was consumed, a second exhaustion has nothing to fire.
        inst.enable_status = true;
        let again = inst.recompute_timeout(start + Duration::from_millis(111));
        assert!(again.unwrap().timeout_cb.is_none());
        assert_eq!(fired.borrow().len(), 1);
    }

    #[test]
    fn test_duration_and_events_decremented() {
        let mut inst = running_instance(50, 50, 16);
        let fired = record_timeouts(&mut inst);
        let start = inst.enable_time;

        assert!(inst.recompute_timeout(start + Duration::from_millis(250)).is_none());

        assert!(inst.enable_status);
        assert_eq!(inst.duration, 25);
        assert_eq!(inst.max_ext_adv_events, 25);
        assert!(fired.borrow().is_empty());
    }

    #[test]
    fn test_events_exhausted() {
        let mut inst = running_instance(0, 50, 16);
        let fired = record_timeouts(&mut inst);
        let start = inst.enable_time;

        fire(inst.recompute_timeout(start + Duration::from_millis(495)));

        assert!(!inst.enable_status);
        assert_eq!(*fired.borrow(), vec![AdvertisingStatus::Controller(ErrorCode::LIMIT_REACHED)]);
    }

    #[test]
    fn test_unbounded_set_untouched() {
        let mut inst = running_instance(0, 0, 160);
        let start = inst.enable_time;
        assert!(inst.recompute_timeout(start + Duration::from_secs(3600)).is_none());
        assert!(inst.enable_status);
    }
}
