//! Constant variables.

/// Default width of the identifier space, in bits.
pub const DEFAULT_BITS: u8 = 32;
/// Widest supported identifier space, identifiers are stored as `u64`.
pub const MAX_BITS: u8 = 64;
/// Routing gives up after `HOP_BOUND_FACTOR * bits` hops unless configured otherwise.
pub const HOP_BOUND_FACTOR: u32 = 2;
/// default stabilize interval in ms
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 3000;
/// default fix fingers interval in ms
pub const DEFAULT_FIX_FINGERS_INTERVAL_MS: u64 = 5000;
