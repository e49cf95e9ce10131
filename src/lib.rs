//! HTTP Range-aware delivery of binary content.
//!
//! A [`source::VirtualSource`] describes bytes that can be opened, positioned
//! and read in chunks. [`http::range::negotiate`] decides which window of those
//! bytes a request gets, and [`delivery::stream`] copies that window to an
//! async sink with optional bandwidth pacing. [`http::BinaryResponse`] ties the
//! three together for hyper; the `rangeserve` binary serves configured
//! directories with it.

pub mod config;
pub mod delivery;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod source;
