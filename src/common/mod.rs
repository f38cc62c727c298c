pub mod client_ip;
pub mod error;
pub mod response;
pub mod token;
