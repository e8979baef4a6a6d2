//! Service Layer
//!
//! Contains the scalable filter controller, which orchestrates domain sizing
//! logic and drives tier backends through the outbound ports.

pub mod scalable_filter;

pub use scalable_filter::{ScalableFilter, Tier};
