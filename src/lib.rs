pub mod common;
pub mod config;
pub mod dataset;
pub mod model;
pub mod objective;
pub mod optim;
pub mod region;
pub mod train;
pub mod utils;
