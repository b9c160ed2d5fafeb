pub mod generator;
pub mod prompt;
pub mod repair_loop;
pub mod service;
pub mod state;
