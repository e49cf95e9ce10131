//! Request handler module
//!
//! Routes requests onto configured files and serves them with range support.

pub mod files;
pub mod router;

// Re-export main entry point
pub use router::handle_request;
