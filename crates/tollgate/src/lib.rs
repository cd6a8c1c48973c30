//! Tollgate - HTTP gateway that forwards caller credentials to third-party AI
//! APIs and throttles raw image fetches.

pub mod admission;
pub mod config;
pub mod cors;
pub mod dispatch;
pub mod handlers;
pub mod response;
pub mod server;
pub mod upstream;
