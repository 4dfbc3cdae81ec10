pub mod checks;
pub mod executor;
pub mod json;
pub mod monitor;
pub mod parser;
pub mod scheduler;
pub mod vu;

pub use scheduler::{RunStatus, Scheduler};
