//! Directional targeting and needle smoothing for the unrestricted-motorway compass.
//!
//! Everything in this crate is pure: no I/O, no clocks, no logging. The backend
//! crate hosts [`controller::TargetingController`] on its event loop.

pub mod calc;
pub mod controller;
pub mod models;
pub mod needle;
pub mod select;
