//! Mocked implementation of RpaGenerator for use in test

use std::cell::Cell;

use async_trait::async_trait;

use crate::{advertising::rpa::RpaGenerator, core::address::RawAddress};

/// Hands out the predictable addresses `4A:00:00:00:00:01`, `4A:00:00:00:00:02`...
#[derive(Default)]
pub struct MockRpaGenerator {
    generated: Cell<u8>,
}

impl MockRpaGenerator {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// The `n`th address handed out, counting from 1.
    pub fn nth_address(n: u8) -> RawAddress {
        RawAddress { address: [0x4a, 0, 0, 0, 0, n] }
    }

    /// Number of addresses generated so far.
    pub fn generated(&self) -> u8 {
        self.generated.get()
    }
}

#[async_trait(?Send)]
impl RpaGenerator for MockRpaGenerator {
    async fn generate_rpa(&self) -> RawAddress {
        let n = self.generated.get().wrapping_add(1);
        self.generated.set(n);
        Self::nth_address(n)
    }
}
