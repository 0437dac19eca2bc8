//! Context-adaptive range coding.
//!
//! The building blocks of every compressed stream in this workspace:
//! a carry-counting byte-oriented range coder ([`RangeEncoder`] /
//! [`RangeDecoder`]), an adaptive frequency model ([`Model`]) and a sparse
//! hash map from 64-bit context keys to models ([`ContextMap`]).
//!
//! The coder is a plain byte sink/source and owns no model; models are
//! handed a `&mut` coder for the duration of a single `encode`/`decode`
//! call. The [`ContextMap`] owns every model it contains.

pub mod coder;
pub mod context_map;
pub mod model;

mod error;

pub use coder::{RangeDecoder, RangeEncoder};
pub use context_map::ContextMap;
pub use error::CoderError;
pub use model::Model;

/// A 64-bit context key. The upper bits carry a domain tag, the lower bits
/// a payload specific to the sub-model (see the `codec` crate).
pub type Context = u64;
