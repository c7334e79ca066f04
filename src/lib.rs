pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod linker;
pub mod model;
pub mod output;
pub mod parser;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod validate;

pub use engine::Engine;
