pub mod db;
pub mod encoder;
pub mod fetch;
pub mod queue;
pub mod storage;
