//! Declarative schemas for checking and decoding `serde_json` values.
//!
//! A [`Schema`] describes an expected shape. Decoding walks the schema
//! against a value and either returns the accepted (possibly transformed)
//! value or every violation found, each with the path where it occurred.
//!
//! ```
//! use regex::Regex;
//! use serde_json::json;
//! use valshape::{object, safe_parse, string, Schema};
//!
//! let person: Schema = object(vec![
//!     (
//!         "name",
//!         string()
//!             .min_len(3)
//!             .max_len(20)
//!             .pattern(Regex::new("^[a-zA-Z ]+$").unwrap()),
//!     ),
//!     ("password", string().min_len(5)),
//! ])
//! .into();
//!
//! let err = safe_parse(&person, &json!({ "name": "Jo", "password": "12345" })).unwrap_err();
//! let entries = err.errors().unwrap().entries();
//! assert_eq!("name", entries[0].path);
//! assert_eq!(
//!     "string length (2) is out of bounds: min: 3, max: 20",
//!     entries[0].message
//! );
//! ```

pub mod coerce;
mod error;
mod form;
mod lazy;
mod schema;
mod serde_schema;
mod validate;

pub use error::*;
pub use form::*;
pub use lazy::*;
pub use schema::*;
pub use serde_schema::*;
pub use validate::*;
