//! Resolvable private address generation (see: 5.3 Vol 6B 1.3.2.2).

use std::cell::RefCell;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use async_trait::async_trait;
use log::debug;
use rand::{rngs::SmallRng, RngCore, SeedableRng};

use crate::core::address::RawAddress;

/// Produces fresh resolvable private addresses for advertising sets.
#[async_trait(?Send)]
pub trait RpaGenerator {
    /// Returns a new resolvable private address.
    async fn generate_rpa(&self) -> RawAddress;
}

/// Generates addresses resolvable with the local Identity Resolving Key.
pub struct IrkRpaGenerator {
    irk: [u8; 16],
    rng: RefCell<SmallRng>,
}

const PRAND_RESOLVABLE_MASK: u8 = 0x3f;
const PRAND_RESOLVABLE_BITS: u8 = 0x40;

/// The random address hash function `ah`: the 24 least significant bits of
/// AES-128 of `r` padded with zeroes.
pub fn ah(irk: &[u8; 16], r: &[u8; 3]) -> [u8; 3] {
    let cipher = Aes128::new(GenericArray::from_slice(irk));
    let mut padded = [0u8; 16];
    padded[13..].copy_from_slice(r);
    let mut block = GenericArray::from(padded);
    cipher.encrypt_block(&mut block);
    [block[13], block[14], block[15]]
}

impl IrkRpaGenerator {
    /// `irk` is most significant octet first.
    pub fn new(irk: [u8; 16]) -> Self {
        Self::with_rng(irk, SmallRng::from_entropy())
    }

    /// Uses `rng` for the random part of the addresses.
    pub fn with_rng(irk: [u8; 16], rng: SmallRng) -> Self {
        IrkRpaGenerator { irk, rng: RefCell::new(rng) }
    }

    fn prand(&self) -> [u8; 3] {
        let mut rng = self.rng.borrow_mut();
        loop {
            let mut prand = [0u8; 3];
            rng.fill_bytes(&mut prand);
            prand[0] = (prand[0] & PRAND_RESOLVABLE_MASK) | PRAND_RESOLVABLE_BITS;

            // The random part must contain at least one 0 and one 1.
            let random_part = [prand[0] & PRAND_RESOLVABLE_MASK, prand[1], prand[2]];
            if random_part != [0, 0, 0] && random_part != [PRAND_RESOLVABLE_MASK, 0xff, 0xff] {
                return prand;
            }
        }
    }

    /// Builds the address for the given `prand`.
    pub fn address_from_prand(&self, prand: [u8; 3]) -> RawAddress {
        let hash = ah(&self.irk, &prand);
        RawAddress { address: [prand[0], prand[1], prand[2], hash[0], hash[1], hash[2]] }
    }

    /// Whether `address` is a resolvable private address generated from our IRK.
    pub fn resolve(&self, address: &RawAddress) -> bool {
        let a = &address.address;
        if a[0] & !PRAND_RESOLVABLE_MASK != PRAND_RESOLVABLE_BITS {
            return false;
        }
        ah(&self.irk, &[a[0], a[1], a[2]]) == [a[3], a[4], a[5]]
    }
}

#[async_trait(?Send)]
impl RpaGenerator for IrkRpaGenerator {
    async fn generate_rpa(&self) -> RawAddress {
        let address = self.address_from_prand(self.prand());
        debug!("generated resolvable private address {}", address);
        address
    }
}
