pub mod config;
pub mod fault;
pub mod clock;
pub mod metrics;
pub mod export;
