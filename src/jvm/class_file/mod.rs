//! Binary model of class files
//!
//! Everything here mirrors a structure of the class file format and knows how to write itself
//! out through [`Serialize`]. Symbolic references are already resolved to constant pool indices.

mod attribute;
mod binary_format;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
