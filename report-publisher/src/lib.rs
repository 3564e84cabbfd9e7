pub mod config;
pub mod errors;
pub mod plugin;
pub mod publisher;
pub mod storage;
pub mod store;
pub mod target;
pub mod test_util;
pub mod walker;
