pub mod analysis;
pub mod bootstrap;
pub mod commands;
pub mod placement;
