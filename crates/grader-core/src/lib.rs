pub mod config;
pub mod debug_log;
pub mod errors;
pub mod grading;
pub mod model;
pub mod providers;
pub mod report;
pub mod storage;
