pub mod command;
pub mod config;
pub mod engine;
pub mod escape;
pub mod health;
pub mod journal;
pub mod paths;
pub mod perception;
pub mod queue;
pub mod runner;
pub mod threat;
