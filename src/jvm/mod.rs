mod access_flags;
mod assembler;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod members;
mod names;

pub use access_flags::*;
pub use assembler::*;
pub use descriptors::*;
pub use errors::*;
pub use members::*;
pub use names::*;
