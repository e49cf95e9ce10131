//! HTTP protocol layer module
//!
//! Range negotiation, header helpers and the binary response type, kept
//! independent of routing so they can be used with any hyper service.

pub mod binary;
pub mod body;
pub mod cache;
pub mod disposition;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use binary::{BinaryResponse, RequestHead, ResponseError, ResponseOptions};
pub use body::DeliveryBody;
pub use disposition::DispositionKind;
pub use range::{negotiate, DeliveryPlan};
pub use response::ResponseBody;
