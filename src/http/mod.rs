//! Authenticated HTTP access to the backend of record.

mod pipeline;
mod request;
mod transport;

pub use pipeline::{AccessPipeline, LoginRedirect, NoRedirect};
pub use request::{ApiRequest, Method, Params};
pub use transport::{HttpTransport, RawResponse, Transport};
