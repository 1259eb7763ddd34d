//! Types shared by the whole crate that are not advertising specific.

pub mod address;
pub mod uuid;
