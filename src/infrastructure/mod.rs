//! Infrastructure layer - external collaborators and transports

pub mod blockchain;
pub mod broadcast;
pub mod jupiter;
pub mod log_sink;
pub mod subscription;
