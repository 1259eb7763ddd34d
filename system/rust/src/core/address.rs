//! Device addresses, with and without their type (public / random)

use std::fmt::{Debug, Display, Formatter};

/// A Bluetooth device address.
///
/// Octets are stored most significant first, i.e. in the order they are
/// printed (`address[0]` is the `AA` of `AA:BB:CC:DD:EE:FF`).
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct RawAddress {
    pub address: [u8; 6],
}

impl RawAddress {
    /// The all-zero address
    pub const EMPTY: Self = RawAddress { address: [0; 6] };

    /// Parses `XX:XX:XX:XX:XX:XX`.
    pub fn from_string<S: AsRef<str>>(s: S) -> Option<RawAddress> {
        let parts: Vec<&str> = s.as_ref().split(':').collect();
        if parts.len() != 6 {
            return None;
        }

        let mut address = [0u8; 6];
        for (octet, part) in address.iter_mut().zip(parts) {
            if part.len() != 2 {
                return None;
            }
            *octet = u8::from_str_radix(part, 16).ok()?;
        }
        Some(RawAddress { address })
    }

    /// Returns true for the all-zero address.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl Display for RawAddress {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let a = &self.address;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", a[0], a[1], a[2], a[3], a[4], a[5])
    }
}

impl Debug for RawAddress {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
#[repr(u8)]
/// The type of an LE address (see: 5.3 Vol 6B 1.3 Device Address)
pub enum AddressType {
    /// A public address
    #[default]
    Public = 0x0,
    /// A random address (either random static or private)
    Random = 0x1,
}

/// An LE address
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct AddressWithType {
    pub address: RawAddress,
    pub address_type: AddressType,
}

impl AddressWithType {
    /// An empty/invalid address
    pub const EMPTY: Self =
        Self { address: RawAddress::EMPTY, address_type: AddressType::Public };
}
