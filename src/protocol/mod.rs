//! The on-wire framing and record codec: length-prefixed frames carrying a
//! human-readable, escaped key/value payload.

pub mod batch;
pub mod keys;
pub mod record;
pub mod wire;

pub use record::Record;
