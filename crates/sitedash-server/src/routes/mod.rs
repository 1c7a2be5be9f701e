pub mod audit;
pub mod builds;
pub mod deploy;
pub mod events;
pub mod me;
