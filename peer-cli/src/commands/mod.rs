//! CLI command implementations.

pub mod code;
pub mod decode;
pub mod demo;
pub mod init;
pub mod status;
