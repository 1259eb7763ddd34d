//! Advertising payloads: building them from structured data, and the
//! adjustments made to them right before they are uploaded.

use std::collections::BTreeMap;

use crate::core::uuid::Uuid;

/// Company identifier of manufacturer specific data.
pub type ManfId = u16;

// Device name length.
const DEVICE_NAME_MAX: usize = 26;

// Advertising data types.
const FLAGS: u8 = 0x01;
const COMPLETE_LIST_16_BIT_SERVICE_UUIDS: u8 = 0x03;
const COMPLETE_LIST_32_BIT_SERVICE_UUIDS: u8 = 0x05;
const COMPLETE_LIST_128_BIT_SERVICE_UUIDS: u8 = 0x07;
const SHORTENED_LOCAL_NAME: u8 = 0x08;
const COMPLETE_LOCAL_NAME: u8 = 0x09;
const TX_POWER_LEVEL: u8 = 0x0a;
const LIST_16_BIT_SERVICE_SOLICITATION_UUIDS: u8 = 0x14;
const LIST_128_BIT_SERVICE_SOLICITATION_UUIDS: u8 = 0x15;
const SERVICE_DATA_16_BIT_UUID: u8 = 0x16;
const LIST_32_BIT_SERVICE_SOLICITATION_UUIDS: u8 = 0x1f;
const SERVICE_DATA_32_BIT_UUID: u8 = 0x20;
const SERVICE_DATA_128_BIT_UUID: u8 = 0x21;
const TRANSPORT_DISCOVERY_DATA: u8 = 0x26;
const MANUFACTURER_SPECIFIC_DATA: u8 = 0xff;
const SERVICE_AD_TYPES: [u8; 3] = [
    COMPLETE_LIST_16_BIT_SERVICE_UUIDS,
    COMPLETE_LIST_32_BIT_SERVICE_UUIDS,
    COMPLETE_LIST_128_BIT_SERVICE_UUIDS,
];
const SOLICIT_AD_TYPES: [u8; 3] = [
    LIST_16_BIT_SERVICE_SOLICITATION_UUIDS,
    LIST_32_BIT_SERVICE_SOLICITATION_UUIDS,
    LIST_128_BIT_SERVICE_SOLICITATION_UUIDS,
];

// Values of the Flags AD structure.
const LIMITED_DISCOVERABLE: u8 = 0x01;
const GENERAL_DISCOVERABLE: u8 = 0x02;

const AD_PAYLOAD_MAX: usize = 254;
const LEGACY_ADV_DATA_LEN_MAX: usize = 31;
const EXT_ADV_DATA_LEN_MAX: usize = 1650;

/// The data to be advertised, or sent in response to active scans.
#[derive(Debug, Default, Clone)]
pub struct AdvertiseData {
    /// Service UUIDs identifying the GATT services of the device.
    pub service_uuids: Vec<Uuid>,
    /// Service UUIDs that peers are invited to connect for.
    pub solicit_uuids: Vec<Uuid>,
    /// Transport discovery data blocks.
    pub transport_discovery_data: Vec<Vec<u8>>,
    /// Manufacturer specific data, keyed by company identifier.
    pub manufacturer_data: BTreeMap<ManfId, Vec<u8>>,
    /// Service data, keyed by service UUID.
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    /// Whether a TX Power Level structure is included. Its value is filled in
    /// once the controller has picked the TX power.
    pub include_tx_power_level: bool,
    /// Whether the device name is included.
    pub include_device_name: bool,
}

impl AdvertiseData {
    fn append_adv_data(dest: &mut Vec<u8>, ad_type: u8, ad_payload: &[u8]) {
        let len = ad_payload.len().min(AD_PAYLOAD_MAX);
        dest.push((len + 1) as u8);
        dest.push(ad_type);
        dest.extend(&ad_payload[..len]);
    }

    // UUIDs are grouped by their shortest length, 16-bit first, so that each
    // group costs a single AD structure.
    fn append_uuids(dest: &mut Vec<u8>, ad_types: &[u8; 3], uuids: &[Uuid]) {
        let mut grouped: [Vec<u8>; 3] = Default::default();

        for uuid in uuids {
            let slice = uuid.shortest_slice();
            let group = match slice.len() {
                2 => 0,
                4 => 1,
                _ => 2,
            };
            grouped[group].extend(slice.iter().rev());
        }

        for (ad_type, bytes) in ad_types.iter().zip(grouped.iter()).filter(|(_, b)| !b.is_empty())
        {
            AdvertiseData::append_adv_data(dest, *ad_type, bytes);
        }
    }

    fn append_service_data(dest: &mut Vec<u8>, service_data: &BTreeMap<Uuid, Vec<u8>>) {
        for (uuid, data) in service_data {
            let slice = uuid.shortest_slice();
            let ad_type = match slice.len() {
                2 => SERVICE_DATA_16_BIT_UUID,
                4 => SERVICE_DATA_32_BIT_UUID,
                _ => SERVICE_DATA_128_BIT_UUID,
            };
            let payload: Vec<u8> = slice.iter().rev().chain(data).cloned().collect();
            AdvertiseData::append_adv_data(dest, ad_type, &payload);
        }
    }

    fn append_device_name(dest: &mut Vec<u8>, device_name: &str) {
        if device_name.is_empty() {
            return;
        }

        let name = device_name.as_bytes();
        if name.len() > DEVICE_NAME_MAX {
            AdvertiseData::append_adv_data(dest, SHORTENED_LOCAL_NAME, &name[..DEVICE_NAME_MAX]);
        } else {
            AdvertiseData::append_adv_data(dest, COMPLETE_LOCAL_NAME, name);
        }
    }

    fn append_manufacturer_data(dest: &mut Vec<u8>, manufacturer_data: &BTreeMap<ManfId, Vec<u8>>) {
        for (id, data) in manufacturer_data {
            let payload = [&id.to_le_bytes()[..], data].concat();
            AdvertiseData::append_adv_data(dest, MANUFACTURER_SPECIFIC_DATA, &payload);
        }
    }

    fn append_transport_discovery_data(dest: &mut Vec<u8>, transport_discovery_data: &[Vec<u8>]) {
        for tdd in transport_discovery_data.iter().filter(|tdd| !tdd.is_empty()) {
            AdvertiseData::append_adv_data(dest, TRANSPORT_DISCOVERY_DATA, tdd);
        }
    }

    /// Serializes the data into AD structures.
    pub fn to_bytes(&self, device_name: &str) -> Vec<u8> {
        let mut bytes = Vec::<u8>::new();
        if self.include_device_name {
            AdvertiseData::append_device_name(&mut bytes, device_name);
        }
        if self.include_tx_power_level {
            // Patched with the selected TX power before upload.
            AdvertiseData::append_adv_data(&mut bytes, TX_POWER_LEVEL, &[0]);
        }
        AdvertiseData::append_manufacturer_data(&mut bytes, &self.manufacturer_data);
        AdvertiseData::append_uuids(&mut bytes, &SERVICE_AD_TYPES, &self.service_uuids);
        AdvertiseData::append_service_data(&mut bytes, &self.service_data);
        AdvertiseData::append_uuids(&mut bytes, &SOLICIT_AD_TYPES, &self.solicit_uuids);
        AdvertiseData::append_transport_discovery_data(&mut bytes, &self.transport_discovery_data);
        bytes
    }
}

/// Whether `bytes` fits in a legacy or an extended advertisement.
pub fn validate_length(is_legacy: bool, bytes: &[u8]) -> bool {
    bytes.len() <= if is_legacy { LEGACY_ADV_DATA_LEN_MAX } else { EXT_ADV_DATA_LEN_MAX }
}

/// Inserts a Flags structure in front of `data`. Limited discoverable mode is
/// advertised when the set only runs for a bounded duration.
pub fn prepend_flags(data: &mut Vec<u8>, limited_duration: bool) {
    let value = if limited_duration { LIMITED_DISCOVERABLE } else { GENERAL_DISCOVERABLE };
    data.splice(0..0, [2, FLAGS, value]);
}

/// Overwrites the value of every TX Power Level structure in `data`.
pub fn patch_tx_power(data: &mut [u8], tx_power: i8) {
    let mut i = 0;
    while i + 1 < data.len() {
        let len = data[i] as usize;
        if data[i + 1] == TX_POWER_LEVEL && len >= 2 && i + 2 < data.len() {
            data[i + 2] = tx_power as u8;
        }
        i += len + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    fn uuid(s: &str) -> Uuid {
        Uuid::from_string(s).unwrap()
    }

    #[test]
    fn test_append_ad_data_clamped() {
        let mut bytes = Vec::<u8>::new();
        let mut ans = vec![255u8, 102];
        ans.extend(Vec::<u8>::from_iter(0..254));

        let payload = Vec::<u8>::from_iter(0..255);
        AdvertiseData::append_adv_data(&mut bytes, 102, &payload);
        assert_eq!(bytes, ans);
    }

    #[test]
    fn test_append_ad_data_multiple() {
        let mut bytes = Vec::<u8>::new();

        AdvertiseData::append_adv_data(&mut bytes, 100, &[0, 1, 2, 3, 4]);
        AdvertiseData::append_adv_data(&mut bytes, 101, &[0]);
        assert_eq!(bytes, vec![6u8, 100, 0, 1, 2, 3, 4, 2, 101, 0]);
    }

    #[test]
    fn test_service_uuids_are_grouped_by_length() {
        let uuid_16 = uuid("0000fef3-0000-1000-8000-00805f9b34fb");
        let uuid_16_2 = uuid("0000aabb-0000-1000-8000-00805f9b34fb");
        let uuid_32 = uuid("00112233-0000-1000-8000-00805f9b34fb");
        let uuid_128 = uuid("00010203-0405-0607-0809-0a0b0c0d0e0f");

        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_uuids(
            &mut bytes,
            &SERVICE_AD_TYPES,
            &[uuid_16, uuid_128, uuid_16_2, uuid_32],
        );

        let exp_16: Vec<u8> = vec![5, 0x3, 0xf3, 0xfe, 0xbb, 0xaa];
        let exp_32: Vec<u8> = vec![5, 0x5, 0x33, 0x22, 0x11, 0x0];
        let exp_128: Vec<u8> = vec![
            17, 0x7, 0xf, 0xe, 0xd, 0xc, 0xb, 0xa, 0x9, 0x8, 0x7, 0x6, 0x5, 0x4, 0x3, 0x2, 0x1, 0x0,
        ];
        assert_eq!(bytes, [exp_16, exp_32, exp_128].concat());
    }

    #[test]
    fn test_solicit_uuids() {
        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_uuids(
            &mut bytes,
            &SOLICIT_AD_TYPES,
            &[uuid("00112233-0000-1000-8000-00805f9b34fb")],
        );
        assert_eq!(bytes, vec![5, 0x1f, 0x33, 0x22, 0x11, 0x0]);
    }

    #[test]
    fn test_service_data() {
        let mut bytes = Vec::<u8>::new();
        let service_data =
            BTreeMap::from([(uuid("0000fef3-0000-1000-8000-00805f9b34fb"), vec![0x4a, 0x17])]);
        AdvertiseData::append_service_data(&mut bytes, &service_data);
        assert_eq!(bytes, vec![5, 0x16, 0xf3, 0xfe, 0x4a, 0x17]);
    }

    #[test]
    fn test_device_name() {
        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_device_name(&mut bytes, "abc");
        assert_eq!(bytes, vec![4, 0x9, 0x61, 0x62, 0x63]);

        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_device_name(&mut bytes, "abcdefghijklmnopqrstuvwxyz7890");
        assert_eq!(bytes.len(), 2 + DEVICE_NAME_MAX);
        assert_eq!(bytes[0], 27);
        assert_eq!(bytes[1], SHORTENED_LOCAL_NAME);
        assert_eq!(&bytes[2..], "abcdefghijklmnopqrstuvwxyz".as_bytes());

        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_device_name(&mut bytes, "");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_manufacturer_data_sorted_by_id() {
        let mut bytes = Vec::<u8>::new();
        let manufacturer_data = BTreeMap::from([(0x0200u16, vec![9]), (0x0123u16, vec![0, 1, 2])]);
        AdvertiseData::append_manufacturer_data(&mut bytes, &manufacturer_data);
        assert_eq!(bytes, vec![6, 0xff, 0x23, 0x01, 0x0, 0x1, 0x2, 4, 0xff, 0x00, 0x02, 9]);
    }

    #[test]
    fn test_transport_discovery_data() {
        let mut bytes = Vec::<u8>::new();
        AdvertiseData::append_transport_discovery_data(
            &mut bytes,
            &[vec![1, 2, 4, 8], vec![], vec![0xa, 0xb]],
        );
        assert_eq!(bytes, vec![0x5, 0x26, 0x1, 0x2, 0x4, 0x8, 3, 0x26, 0xa, 0xb]);
    }

    #[test]
    fn test_to_bytes_order() {
        let data = AdvertiseData {
            include_device_name: true,
            include_tx_power_level: true,
            service_uuids: vec![Uuid::from_u16(0x180f)],
            manufacturer_data: BTreeMap::from([(0x00e0, vec![0x01])]),
            ..Default::default()
        };
        assert_eq!(
            data.to_bytes("ab"),
            vec![3, 0x09, 0x61, 0x62, 2, 0x0a, 0, 4, 0xff, 0xe0, 0x00, 0x01, 3, 0x03, 0x0f, 0x18]
        );
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length(true, &[0; 31]));
        assert!(!validate_length(true, &[0; 32]));
        assert!(validate_length(false, &[0; 1650]));
        assert!(!validate_length(false, &[0; 1651]));
    }

    #[test]
    fn test_prepend_flags() {
        let mut data = vec![2, 0x0a, 0];
        prepend_flags(&mut data, false);
        assert_eq!(data, vec![2, 0x01, 0x02, 2, 0x0a, 0]);

        let mut data = vec![];
        prepend_flags(&mut data, true);
        assert_eq!(data, vec![2, 0x01, 0x01]);
    }

    #[test]
    fn test_patch_tx_power() {
        let mut data = vec![3, 0x09, 0x61, 0x62, 2, 0x0a, 0, 2, 0x0a, 0x7f];
        patch_tx_power(&mut data, -9);
        assert_eq!(data, vec![3, 0x09, 0x61, 0x62, 2, 0x0a, 0xf7, 2, 0x0a, 0xf7]);
    }

    #[test]
    fn test_patch_tx_power_ignores_truncated_structures() {
        let mut data = vec![3, 0x09, 0x61, 0x62, 1, 0x0a];
        patch_tx_power(&mut data, 4);
        assert_eq!(data, vec![3, 0x09, 0x61, 0x62, 1, 0x0a]);

        let mut data = vec![0, 0, 5, 0x0a];
        patch_tx_power(&mut data, 4);
        assert_eq!(data, vec![0, 0, 5, 0x0a]);
    }
}
