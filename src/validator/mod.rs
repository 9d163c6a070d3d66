//! Parameter contract enforcement.
//!
//! [`validate`] turns the [`RawParams`] extracted from a request into
//! [`ValidatedParams`] according to an endpoint's `required_params`,
//! `optional_params` and `params_description`.
//!
//! Coercion rules for values supplied by the caller:
//!
//! | declared type | accepted input |
//! |---|---|
//! | `string` | strings, numbers and booleans (stringified) |
//! | `integer` | integral numbers, numeric strings |
//! | `number` | numbers, numeric strings |
//! | `boolean` | booleans, `0`/`1`, `true`/`false`/`yes`/`no`/`on`/`off` |
//! | `array` | arrays, comma separated strings, single scalars |
//! | `object` | objects, JSON-encoded object strings |
//! | `file` | uploaded bytes, base64 strings, `{filename, content_type, data}` |
//!
//! Defaults from `optional_params` are inserted as configured and are not coerced.

mod params;

pub use params::{validate, RawParams, UploadedFile, ValidatedParams, ValidationError};
