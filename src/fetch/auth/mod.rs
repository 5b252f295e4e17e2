//! Credential wrappers for the Drive files API.
//!
//! Obtaining the credential (consent flow, token refresh) happens elsewhere;
//! these only attach an already-valid token or key to outgoing requests.

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;
