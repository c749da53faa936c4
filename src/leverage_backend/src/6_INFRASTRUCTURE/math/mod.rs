//! Fixed-point arithmetic over candid `Nat`

pub mod pure_math;

pub use pure_math::*;
