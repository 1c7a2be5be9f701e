pub mod audit;
pub mod builds;
pub mod config;
pub mod deploy;
pub mod prune;
pub mod serve;
