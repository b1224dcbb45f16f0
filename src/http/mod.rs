//! HTTP transport used by the step runner.

pub mod client;
pub mod method;
pub mod request;
pub mod response;
