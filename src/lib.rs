#![no_std]

extern crate alloc;

mod biquad;
mod celt;
pub mod opus;
pub mod opus_encoder;
pub mod packet;
pub mod repacketizer;

pub use crate::celt::opus_strerror;

/// Returns the textual version identifier for the library, matching the
/// format of `opus_get_version_string` from the reference implementation.
#[must_use]
pub fn opus_get_version_string() -> &'static str {
    crate::celt::opus_get_version_string()
}
