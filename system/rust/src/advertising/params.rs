//! Advertising and periodic advertising parameters, both the caller-facing
//! forms and the controller-level forms they are converted into.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::clamp;

bitflags! {
    /// Advertising_Event_Properties of LE Set Extended Advertising Parameters.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AdvertisingEventProperties: u16 {
        /// Connectable advertising
        const CONNECTABLE = 0x01;
        /// Scannable advertising
        const SCANNABLE = 0x02;
        /// Directed advertising
        const DIRECTED = 0x04;
        /// High duty cycle directed connectable advertising
        const HIGH_DUTY_CYCLE = 0x08;
        /// Use legacy advertising PDUs
        const LEGACY = 0x10;
        /// Omit the advertiser's address from all PDUs
        const ANONYMOUS = 0x20;
        /// Include TxPower in the extended header
        const INCLUDE_TX_POWER = 0x40;
    }
}

impl AdvertisingEventProperties {
    /// Directed sets are one-shot: the controller does not resume them.
    pub fn is_directed(self) -> bool {
        self.intersects(Self::DIRECTED | Self::HIGH_DUTY_CYCLE)
    }
}

/// An LE PHY.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum LePhy {
    /// LE 1M
    #[default]
    Phy1m = 1,
    /// LE 2M
    Phy2m = 2,
    /// LE Coded
    PhyCoded = 3,
}

// Advertising interval range, in 0.625 ms units.
const INTERVAL_MAX: i32 = 0xff_ffff; // 10485.759375 sec
const INTERVAL_MIN: i32 = 160; // 100 ms
const INTERVAL_DELTA: i32 = 50; // 31.25 ms gap between min and max

// Periodic advertising interval range, in 1.25 ms units.
const PERIODIC_INTERVAL_MAX: i32 = 65519; // 81.89875 sec
const PERIODIC_INTERVAL_MIN: i32 = 80; // 100 ms
const PERIODIC_INTERVAL_DELTA: i32 = 16; // 20 ms gap between min and max

const TX_POWER_MIN: i32 = -127;
const TX_POWER_MAX: i32 = 1;

/// All three primary advertising channels.
pub const ALL_CHANNELS: u8 = 0x07;

/// Bit of the periodic advertising properties requesting TxPower in the header.
pub const PERIODIC_INCLUDE_TX_POWER: u16 = 0x40;

/// Controller-level parameters of an advertising set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertiseParameters {
    /// Type of the advertising events
    pub event_properties: AdvertisingEventProperties,
    /// Minimum advertising interval, in 0.625 ms units
    pub min_interval: u32,
    /// Maximum advertising interval, in 0.625 ms units
    pub max_interval: u32,
    /// Bitmap of the primary channels used
    pub channel_map: u8,
    /// Requested TX power in dBm. The controller may pick another one.
    pub tx_power: i8,
    /// PHY of the primary advertising channel
    pub primary_phy: LePhy,
    /// PHY of the secondary advertising channel
    pub secondary_phy: LePhy,
    /// Advertising filter policy
    pub filter_policy: u8,
    /// Whether scan request notifications are reported
    pub scan_request_notification_enable: bool,
}

impl Default for AdvertiseParameters {
    fn default() -> Self {
        AdvertiseParameters {
            event_properties: AdvertisingEventProperties::empty(),
            min_interval: INTERVAL_MIN as u32,
            max_interval: (INTERVAL_MIN + INTERVAL_DELTA) as u32,
            channel_map: ALL_CHANNELS,
            tx_power: 0,
            primary_phy: LePhy::Phy1m,
            secondary_phy: LePhy::Phy1m,
            filter_policy: 0,
            scan_request_notification_enable: false,
        }
    }
}

/// Advertising parameters for each BLE advertising set, as a caller
/// describes them.
#[derive(Debug, Default, Clone)]
pub struct AdvertisingSetParameters {
    /// Whether the advertisement will be connectable.
    pub connectable: bool,
    /// Whether the advertisement will be scannable.
    pub scannable: bool,
    /// Whether the legacy advertisement will be used.
    pub is_legacy: bool,
    /// Whether the advertisement will be anonymous.
    pub is_anonymous: bool,
    /// Whether the TX Power will be included.
    pub include_tx_power: bool,
    /// Primary advertising phy.
    pub primary_phy: LePhy,
    /// Secondary advertising phy.
    pub secondary_phy: LePhy,
    /// The advertising interval, in 0.625 ms units. The valid range is from
    /// 160 (100 ms) to 16777215 (10485.759375 sec).
    pub interval: i32,
    /// Transmission power in dBm. The valid range is [-127, 1].
    pub tx_power_level: i32,
}

impl From<AdvertisingSetParameters> for AdvertiseParameters {
    fn from(p: AdvertisingSetParameters) -> Self {
        let mut props = AdvertisingEventProperties::empty();
        props.set(AdvertisingEventProperties::CONNECTABLE, p.connectable);
        props.set(AdvertisingEventProperties::SCANNABLE, p.scannable);
        props.set(AdvertisingEventProperties::LEGACY, p.is_legacy);
        props.set(AdvertisingEventProperties::ANONYMOUS, p.is_anonymous);
        props.set(AdvertisingEventProperties::INCLUDE_TX_POWER, p.include_tx_power);

        let interval = clamp(p.interval, INTERVAL_MIN, INTERVAL_MAX - INTERVAL_DELTA);

        AdvertiseParameters {
            event_properties: props,
            min_interval: interval as u32,
            max_interval: (interval + INTERVAL_DELTA) as u32,
            channel_map: ALL_CHANNELS,
            tx_power: clamp(p.tx_power_level, TX_POWER_MIN, TX_POWER_MAX) as i8,
            primary_phy: p.primary_phy,
            secondary_phy: p.secondary_phy,
            filter_policy: 0,
            scan_request_notification_enable: false,
        }
    }
}

/// Controller-level periodic advertising parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeriodicAdvertisingParameters {
    /// Whether periodic advertising is requested at all
    pub enable: bool,
    /// Whether the ADI field is included in AUX_SYNC_IND
    pub include_adi: bool,
    /// Minimum periodic interval, in 1.25 ms units
    pub min_interval: u16,
    /// Maximum periodic interval, in 1.25 ms units
    pub max_interval: u16,
    /// Periodic_Advertising_Properties
    pub periodic_advertising_properties: u16,
}

/// Periodic advertising parameters, as a caller describes them.
#[derive(Clone, Debug, Default)]
pub struct PeriodicAdvertisingSetParameters {
    /// Whether TX Power level will be included.
    pub include_tx_power: bool,
    /// Periodic advertising interval in 1.25 ms units. Valid values are from
    /// 80 (100 ms) to 65519 (81.89875 sec).
    pub interval: i32,
}

impl From<PeriodicAdvertisingSetParameters> for PeriodicAdvertisingParameters {
    fn from(p: PeriodicAdvertisingSetParameters) -> Self {
        let interval = clamp(
            p.interval,
            PERIODIC_INTERVAL_MIN,
            PERIODIC_INTERVAL_MAX - PERIODIC_INTERVAL_DELTA,
        );

        PeriodicAdvertisingParameters {
            enable: true,
            include_adi: false,
            min_interval: interval as u16,
            max_interval: (interval + PERIODIC_INTERVAL_DELTA) as u16,
            periodic_advertising_properties: if p.include_tx_power {
                PERIODIC_INCLUDE_TX_POWER
            } else {
                0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn test_set_parameters_conversion() {
        let params: AdvertiseParameters = AdvertisingSetParameters {
            connectable: true,
            scannable: true,
            is_legacy: true,
            interval: 400,
            tx_power_level: -7,
            ..Default::default()
        }
        .into();

        assert_eq!(
            params.event_properties,
            AdvertisingEventProperties::CONNECTABLE
                | AdvertisingEventProperties::SCANNABLE
                | AdvertisingEventProperties::LEGACY
        );
        assert_eq!(params.event_properties.bits(), 0x13);
        assert_eq!(params.min_interval, 400);
        assert_eq!(params.max_interval, 450);
        assert_eq!(params.channel_map, ALL_CHANNELS);
        assert_eq!(params.tx_power, -7);
    }

    #[test]
    fn test_set_parameters_are_clamped() {
        let low: AdvertiseParameters =
            AdvertisingSetParameters { interval: 20, tx_power_level: -300, ..Default::default() }
                .into();
        assert_eq!(low.min_interval, 160);
        assert_eq!(low.max_interval, 210);
        assert_eq!(low.tx_power, -127);

        let high: AdvertiseParameters = AdvertisingSetParameters {
            interval: i32::MAX,
            tx_power_level: 20,
            ..Default::default()
        }
        .into();
        assert_eq!(high.min_interval, 0xff_ffff - 50);
        assert_eq!(high.max_interval, 0xff_ffff);
        assert_eq!(high.tx_power, 1);
    }

    #[test]
    fn test_periodic_parameters_conversion() {
        let p: PeriodicAdvertisingParameters =
            PeriodicAdvertisingSetParameters { include_tx_power: true, interval: 10 }.into();
        assert!(p.enable);
        assert!(!p.include_adi);
        assert_eq!(p.min_interval, 80);
        assert_eq!(p.max_interval, 96);
        assert_eq!(p.periodic_advertising_properties, 0x40);

        let p: PeriodicAdvertisingParameters =
            PeriodicAdvertisingSetParameters { include_tx_power: false, interval: 70000 }.into();
        assert_eq!(p.min_interval, 65503);
        assert_eq!(p.max_interval, 65519);
        assert_eq!(p.periodic_advertising_properties, 0);
    }

    #[test]
    fn test_directed_properties() {
        assert!(AdvertisingEventProperties::DIRECTED.is_directed());
        assert!(AdvertisingEventProperties::HIGH_DUTY_CYCLE.is_directed());
        assert!(!(AdvertisingEventProperties::CONNECTABLE | AdvertisingEventProperties::LEGACY)
            .is_directed());
    }

    #[test]
    fn test_phy_from_primitive() {
        assert_eq!(LePhy::from_u8(2), Some(LePhy::Phy2m));
        assert_eq!(LePhy::from_u8(4), None);
    }
}
