//! Record persistence and configuration tests

pub mod config_test;
pub mod repository_test;
