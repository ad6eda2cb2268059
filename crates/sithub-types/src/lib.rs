//! Foundation types for SitHub.
//!
//! Every other SitHub crate depends on `sithub-types` for [`ObjectId`], the
//! fixed-length BLAKE3 digest that names each immutable object in a
//! repository.

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{ObjectId, OBJECT_ID_LEN};
