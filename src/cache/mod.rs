//! Content-addressed artifact cache: fingerprints, the single-flight store, and disk persistence.

pub mod disk;
pub mod fingerprint;
pub mod store;
