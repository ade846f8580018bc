pub mod blueprint;
pub mod circuit;
pub mod config;
pub mod error;
pub mod graph;
pub mod interaction;
pub mod logic;
pub mod simulator;
pub mod transform;
pub mod utils;
