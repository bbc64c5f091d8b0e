//! Ports - Traits for the external collaborators.

pub mod encoder;
pub mod storage;
