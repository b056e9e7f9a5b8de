//! Foundation module - ambient utilities shared by every layer
//!
//! Currently only logging setup; the crate itself logs through the `log` facade.

pub mod logging;
