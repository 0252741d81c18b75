pub mod server;
pub mod storage;
