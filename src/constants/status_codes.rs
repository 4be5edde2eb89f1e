//! Status codes written back to a trigger (or its acknowledgement tag) when
//! the engine, rather than the request forwarder, decides the outcome.

/// Companion tags could not be read.
pub const MULTI_READ_ERROR: i64 = 2;
/// The request forwarder failed without reporting its own code.
pub const FORWARD_ERROR: i64 = 3;
/// At least one callback item could not be resolved or written.
pub const CALLBACK_ITEM_ERROR: i64 = 4;
/// No request forwarder is registered.
pub const NO_FORWARDER: i64 = 5;
/// The request forwarder did not answer in time.
pub const FORWARD_TIMEOUT: i64 = 6;
