// Library exports for testing
pub mod adapter;
pub mod api;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod router;

pub use adapter::{api_handler, handler, suspend_handler, RequestContext, ResponseWriter};
pub use errors::{ApiError, ApiResponse, CatalogError, EnvelopeError, Failure, PreHook};
pub use router::{ApiRouter, ErrorContext};
