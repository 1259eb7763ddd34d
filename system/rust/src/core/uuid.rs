//! 128-bit UUIDs and their shortened Bluetooth SIG forms.

use std::fmt::{Display, Formatter};

/// 0000xxxx-0000-1000-8000-00805F9B34FB
const BASE_UUID_TAIL: [u8; 12] =
    [0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb];

/// A UUID, stored big-endian (in the order it is printed).
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uuid {
    pub uu: [u8; 16],
}

impl Uuid {
    /// Parses the canonical 8-4-4-4-12 form. Case is ignored.
    pub fn from_string<S: AsRef<str>>(s: S) -> Option<Uuid> {
        let s = s.as_ref();
        let groups: Vec<&str> = s.split('-').collect();
        if groups.iter().map(|g| g.len()).collect::<Vec<_>>() != [8, 4, 4, 4, 12] {
            return None;
        }

        let hex: String = groups.concat();
        let mut uu = [0u8; 16];
        for (i, byte) in uu.iter_mut().enumerate() {
            *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Uuid { uu })
    }

    /// Builds the full UUID of a 16-bit SIG assigned number.
    pub fn from_u16(short: u16) -> Uuid {
        let mut uu = [0u8; 16];
        uu[2..4].copy_from_slice(&short.to_be_bytes());
        uu[4..].copy_from_slice(&BASE_UUID_TAIL);
        Uuid { uu }
    }

    /// Returns the shortest big-endian representation of the UUID: 2 bytes
    /// for 16-bit, 4 bytes for 32-bit SIG UUIDs, otherwise all 16 bytes.
    pub fn shortest_slice(&self) -> &[u8] {
        if self.uu[4..] != BASE_UUID_TAIL {
            return &self.uu;
        }
        if self.uu[0] == 0 && self.uu[1] == 0 {
            &self.uu[2..4]
        } else {
            &self.uu[0..4]
        }
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        for (i, b) in self.uu.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
