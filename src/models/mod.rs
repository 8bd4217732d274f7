pub mod common;
pub mod errors;
pub mod filter;
pub mod logs;
