pub mod runner;

pub use runner::{JobEvent, JobMsg, JobRunner};
