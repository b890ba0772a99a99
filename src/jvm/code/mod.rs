//! Method bodies
//!
//! A method body is built in a [`CodeBuffer`]: straight-line [`Instruction`]s, jumps
//! ([`BranchInstruction`]) to [`Label`]s, switches, and exception handlers. Nothing about branch
//! offsets needs to be known while emitting. When the buffer is finished, the code is laid out
//! (see [`jump_encoding`]), labels are resolved, and the maximum stack depth is computed.

mod code_buffer;
pub mod decode;
mod exceptions;
mod instructions;
pub mod jump_encoding;
mod label;
mod max_stack;
mod switch;

pub use code_buffer::*;
pub use exceptions::*;
pub use instructions::*;
pub use jump_encoding::JumpLayout;
pub use label::*;
pub use max_stack::*;
pub use switch::*;
