//! Incremental assembler for JVM class files
//!
//! The entry point is [`jvm::ClassAssembler`]: declare fields, open methods, emit instructions
//! against labels, and finally serialize the whole class to the byte-exact [class file
//! format][0]. Everything that involves binary layout (constant pool indices, operand encodings,
//! branch offsets, switch padding, exception tables) is resolved by the assembler, so callers
//! only ever deal in names, descriptors, and opaque labels.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se8/html/jvms-4.html

pub mod jvm;
pub mod util;
