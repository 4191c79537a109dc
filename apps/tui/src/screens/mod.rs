//! Dashboard screens.
//!
//! The dashboard is a single screen; the help overlay is drawn on top of it.

mod dashboard;

pub(crate) use dashboard::draw;
