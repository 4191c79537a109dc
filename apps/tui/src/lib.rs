//! annodemo dashboard — pick a dataset and a command, watch it run.
//!
//! Built with `ratatui` + `crossterm` around an explicit event loop. The
//! selected command runs on a tokio task and reports back over a channel.

mod app;
mod runner;
mod screens;
mod widgets;

pub use app::run;
