//! HTTP plumbing used by the API client
//!
//! Request construction, the transport seam, and status validation. None of
//! these hold state; the caching policy lives in [`crate::client`].

mod method;
mod request;
mod transport;
mod validate;

pub use method::Method;
pub use request::{build_request, AuthProvider, BearerToken, NoAuth, PreparedRequest};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
pub use validate::{validate, validate_status};
