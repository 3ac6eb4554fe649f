//! Input validation for download requests.
//!
//! Only URL validation lives here: it is purely syntactic and runs before any
//! filename is reserved or any network request is made.

mod error;
mod validate;

pub use error::{DEFAULT_MAX_URL_LENGTH, UrlRejection};
pub use validate::{UrlValidator, ValidationOutcome, validate_url};
