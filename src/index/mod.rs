//! Package index upload over the legacy upload API
//!
//! Authentication is trusted publishing only: each run mints a short-lived
//! upload token from the workflow identity and sends it as the `__token__`
//! user's password.

mod metadata;
mod uploader;

pub use metadata::{CoreMetadata, DistributionKind, form_field_name, read_metadata};
pub use uploader::IndexPublisher;
