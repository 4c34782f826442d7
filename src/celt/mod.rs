//! Shared CELT-side helpers.
//!
//! The packet layer and the encoder front-end both lean on the small
//! fixed-point toolbox that the CELT code ships: Q-format multiplies, the
//! integer square root and reciprocal approximations, and the canonical
//! error-string table. Everything here is self-contained so the modules can
//! be exercised in isolation.

#[allow(clippy::module_inception)]
mod celt;
pub(crate) mod fixed_ops;
mod math;
pub(crate) mod math_fixed;

#[allow(unused_imports)]
pub(crate) use celt::*;
#[allow(unused_imports)]
pub(crate) use fixed_ops::*;
#[allow(unused_imports)]
pub(crate) use math::*;
#[allow(unused_imports)]
pub(crate) use math_fixed::*;

pub use celt::opus_strerror;
