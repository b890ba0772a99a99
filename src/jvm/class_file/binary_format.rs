use byteorder::{BigEndian, WriteBytesExt};
use std::io::Result;

/// Serialization into the binary layout of class files
///
/// Class files use a handful of conventions that make a dedicated trait simpler than `serde`:
/// everything is big endian, tags are `u8`, and sequences are usually prefixed by a `u16` count.
pub trait Serialize: Sized {
    /// Write the binary representation into an output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

macro_rules! serialize_primitive {
    ($typ:ty, $write:ident) => {
        impl Serialize for $typ {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }
    };
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for i8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i8(*self)
    }
}

serialize_primitive!(u16, write_u16);
serialize_primitive!(u32, write_u32);
serialize_primitive!(u64, write_u64);
serialize_primitive!(i16, write_i16);
serialize_primitive!(i32, write_i32);
serialize_primitive!(i64, write_i64);
serialize_primitive!(f32, write_f32);
serialize_primitive!(f64, write_f64);

/// Sequences are prefixed with their `u16` length
///
/// Callers are responsible for checking that the length fits (see `Error::TooManyEntries`).
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        self.iter().try_for_each(|elem| elem.serialize(writer))
    }
}
