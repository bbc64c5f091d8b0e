//! Application layer - Services that use ports.

pub mod fetcher;
pub mod multirate;
pub mod publisher;
pub mod session;
pub mod staging;
pub mod validator;
