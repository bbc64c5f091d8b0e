//! Domain layer - Pure business logic.

pub mod command;
pub mod event;
pub mod generator;
pub mod hls;
pub mod naming;
pub mod quality;
