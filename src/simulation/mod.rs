pub mod backward;
pub mod config;
pub mod engine;
pub mod forward;
pub mod sampler;
pub mod statistics;
