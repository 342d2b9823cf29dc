//! Low-level building blocks shared by the store and the engine.

/// Byte-level utilities and encoding/decoding.
///
/// Varints, length-prefixed fields and a checked cursor.
pub mod bytes;

/// Scoped repository locks.
pub mod concurrency;
