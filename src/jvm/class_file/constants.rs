use crate::jvm::class_file::{Attribute, AttributeLike, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

/// Largest `constant_pool_count` allowed in a class file
///
/// Valid indices are `1..constant_pool_count`, so the last usable index is one less than this.
pub const MAX_CONSTANT_POOL_COUNT: usize = u16::MAX as usize;

/// Longest modified UTF-8 encoding a `CONSTANT_Utf8_info` can hold
pub const MAX_UTF8_LENGTH: usize = u16::MAX as usize;

/// Deduplicating constant pool builder
///
/// The pool is append only: requesting a constant that is already in the pool returns the
/// index it was first given. Numeric constants are deduplicated on their bit patterns, so `0.0`
/// and `-0.0` (or two different NaNs) get separate entries.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<String, Utf8ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    field_refs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    method_refs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
}

impl ConstantsPool {
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            name_and_types: HashMap::new(),
            field_refs: HashMap::new(),
            method_refs: HashMap::new(),
        }
    }

    /// Value of `constant_pool_count` for the pool as it currently stands
    pub fn count(&self) -> usize {
        self.constants.offset_len().0
    }

    /// Number of entries (not slots) in the pool
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Look up the constant at a pool index
    ///
    /// The unusable slot after a `long` or `double` has no constant.
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.0 as usize)).ok()
    }

    /// Push a constant, provided there is space for it
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > MAX_CONSTANT_POOL_COUNT {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let cow = utf8.into();
        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            return Ok(*idx);
        }
        let owned = cow.into_owned();
        let length = modified_utf8_len(&owned);
        if length > MAX_UTF8_LENGTH {
            return Err(Error::Utf8ConstantTooLong { length });
        }
        let idx = Utf8ConstantIndex(self.push_constant(Constant::Utf8(owned.clone()))?);
        self.utf8s.insert(owned, idx);
        Ok(idx)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&integer) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Integer(integer))?;
        self.integers.insert(integer, idx);
        Ok(idx)
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        let bits = float.to_bits();
        if let Some(idx) = self.floats.get(&bits) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Float(float))?;
        self.floats.insert(bits, idx);
        Ok(idx)
    }

    /// Get or insert a long constant (which takes up two slots)
    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.longs.get(&long) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Long(long))?;
        self.longs.insert(long, idx);
        Ok(idx)
    }

    /// Get or insert a double constant (which takes up two slots)
    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        let bits = double.to_bits();
        if let Some(idx) = self.doubles.get(&bits) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Double(double))?;
        self.doubles.insert(bits, idx);
        Ok(idx)
    }

    /// Get or insert a class constant from the utf8 constant holding its name
    pub fn get_class(&mut self, name: Utf8ConstantIndex) -> Result<ClassConstantIndex, Error> {
        if let Some(idx) = self.classes.get(&name) {
            return Ok(*idx);
        }
        let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
        self.classes.insert(name, idx);
        Ok(idx)
    }

    /// Get or insert a string constant from the utf8 constant holding its contents
    pub fn get_string(&mut self, utf8: Utf8ConstantIndex) -> Result<StringConstantIndex, Error> {
        if let Some(idx) = self.strings.get(&utf8) {
            return Ok(*idx);
        }
        let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
        self.strings.insert(utf8, idx);
        Ok(idx)
    }

    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::NameAndType { name, descriptor };
        let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
        self.name_and_types.insert(key, idx);
        Ok(idx)
    }

    pub fn get_field_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<FieldRefConstantIndex, Error> {
        let key = (class, name_and_type);
        if let Some(idx) = self.field_refs.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::FieldRef(class, name_and_type);
        let idx = FieldRefConstantIndex(self.push_constant(constant)?);
        self.field_refs.insert(key, idx);
        Ok(idx)
    }

    /// Get or insert a method reference (an interface method reference if `is_interface`)
    pub fn get_method_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let key = (class, name_and_type, is_interface);
        if let Some(idx) = self.method_refs.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        };
        let idx = MethodRefConstantIndex(self.push_constant(constant)?);
        self.method_refs.insert(key, idx);
        Ok(idx)
    }

    /// Add an attribute, interning its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info)?;
        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> ConstantsPool {
        ConstantsPool::new()
    }
}

/// Types that can be interned into the constant pool
pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(&self, constants_pool: &mut ConstantsPool) -> Result<Index, Error>;
}

/// Constants as in the constant pool
///
/// Only the kinds of constant that the assembler can generate are included (no method handles,
/// method types, or dynamic constants).
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class, interface, or array class
    Class(Utf8ConstantIndex),

    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Raw string value, encoded as modified UTF-8 when serialized
    Utf8(String),
}

impl Constant {
    /// Tag byte which starts the constant's serialized form
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef(..) => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true, ..
            } => 11,
            Constant::NameAndType { .. } => 12,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                let length = u16::try_from(buffer.len()).map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "utf8 constant is longer than 65535 bytes",
                    )
                })?;
                length.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => integer.serialize(writer)?,
            Constant::Float(float) => float.serialize(writer)?,
            Constant::Long(long) => long.serialize(writer)?,
            Constant::Double(double) => double.serialize(writer)?,
            Constant::Class(name) => name.serialize(writer)?,
            Constant::String(utf8) => utf8.serialize(writer)?,
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// Pool is prefixed by `constant_pool_count`, which is one more than the largest index
impl Serialize for OffsetVec<Constant> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.offset_len().0 as u16).serialize(writer)?;
        self.iter()
            .try_for_each(|(_, _, constant)| constant.serialize(writer))
    }
}

/// `long` and `double` constants occupy two pool indices, the second of which is unusable
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8, as used by `DataInput`
///
/// It differs from standard UTF-8 in two ways: `\u{0000}` is written in the 2-byte form (so the
/// output never contains a zero byte) and supplementary characters are written as a surrogate
/// pair of 3-byte sequences.
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    let mut units = [0u16; 2];
    for c in string.chars() {
        if c == '\u{0000}' {
            buffer.extend_from_slice(&[0xC0, 0x80]);
            continue;
        }
        for unit in c.encode_utf16(&mut units).iter() {
            let unit = *unit as u32;
            if unit < 0x80 {
                buffer.push(unit as u8);
            } else if unit < 0x800 {
                buffer.push(0xC0 | (unit >> 6) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            } else {
                buffer.push(0xE0 | (unit >> 12) as u8);
                buffer.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                buffer.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    buffer
}

/// Length of [`encode_modified_utf8`]'s output, without building it
pub fn modified_utf8_len(string: &str) -> usize {
    string
        .chars()
        .map(|c| match c as u32 {
            0 => 2,
            1..=0x7F => 1,
            0x80..=0x7FF => 2,
            0x800..=0xFFFF => 3,
            _ => 6,
        })
        .sum()
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

macro_rules! constant_index {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }
        )*
    };
}

constant_index! {
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    /// Index of a `CONSTANT_Class_info`
    ClassConstantIndex,
    FieldRefConstantIndex,
    /// Index of a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    MethodRefConstantIndex,
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deduplicated_constants() {
        let mut pool = ConstantsPool::new();
        let hello = pool.get_utf8("hello").unwrap();
        let one = pool.get_integer(1).unwrap();
        assert_eq!(hello, pool.get_utf8(String::from("hello")).unwrap());
        assert_eq!(one, pool.get_integer(1).unwrap());
        assert_eq!(hello.0, ConstantIndex(1));
        assert_eq!(one, ConstantIndex(2));

        let string = pool.get_string(hello).unwrap();
        assert_eq!(string, pool.get_string(hello).unwrap());
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        let long = pool.get_long(1234).unwrap();
        let next = pool.get_integer(7).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(next, ConstantIndex(3));

        let double = pool.get_double(2.5).unwrap();
        let after = pool.get_utf8("x").unwrap();
        assert_eq!(double, ConstantIndex(4));
        assert_eq!(after.0, ConstantIndex(6));
        assert_eq!(pool.count(), 7);

        assert!(pool.get(ConstantIndex(2)).is_none());
        assert!(matches!(pool.get(ConstantIndex(4)), Some(Constant::Double(_))));
    }

    #[test]
    fn floats_compare_by_bits() {
        let mut pool = ConstantsPool::new();
        let zero = pool.get_float(0.0).unwrap();
        let neg_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(zero, neg_zero);
        assert_eq!(pool.get_float(f32::NAN).unwrap(), pool.get_float(f32::NAN).unwrap());
    }

    #[test]
    fn interface_and_class_methods_are_distinct() {
        let mut pool = ConstantsPool::new();
        let name = pool.get_utf8("java/util/List").unwrap();
        let class = pool.get_class(name).unwrap();
        let size = pool.get_utf8("size").unwrap();
        let desc = pool.get_utf8("()I").unwrap();
        let nat = pool.get_name_and_type(size, desc).unwrap();
        let virt = pool.get_method_ref(class, nat, false).unwrap();
        let intf = pool.get_method_ref(class, nat, true).unwrap();
        assert_ne!(virt, intf);
        assert_eq!(intf, pool.get_method_ref(class, nat, true).unwrap());
        assert_eq!(pool.get(intf.0).map(Constant::tag), Some(11));
    }

    #[test]
    fn pool_overflow() {
        let mut pool = ConstantsPool::new();
        for i in 0..(MAX_CONSTANT_POOL_COUNT as i32 - 1) {
            pool.get_integer(i).unwrap();
        }
        assert_eq!(pool.count(), MAX_CONSTANT_POOL_COUNT);
        match pool.get_integer(-1) {
            Err(Error::ConstantPoolOverflow { offset, .. }) => assert_eq!(offset, 65535),
            other => panic!("expected overflow, got {:?}", other),
        }
    }

    #[test]
    fn utf8_length_limit() {
        let mut pool = ConstantsPool::new();

        // 'ऄ' takes 3 bytes, so 21845 of them fill the limit exactly
        let longest = "ऄ".repeat(MAX_UTF8_LENGTH / 3);
        assert_eq!(modified_utf8_len(&longest), MAX_UTF8_LENGTH);
        pool.get_utf8(longest.as_str()).unwrap();

        match pool.get_utf8(format!("{}\x00", longest)) {
            Err(Error::Utf8ConstantTooLong { length }) => assert_eq!(length, 65537),
            other => panic!("expected a length error, got {:?}", other),
        }
        let err = pool.get_utf8("a".repeat(70_000)).unwrap_err();
        assert_eq!(err.kind(), crate::jvm::ErrorKind::FormatLimit);

        // Rejected strings leave no trace in the pool
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn serialized_pool() {
        let mut pool = ConstantsPool::new();
        pool.get_long(1).unwrap();
        pool.get_utf8("a").unwrap();
        let mut out = vec![];
        pool.into_offset_vec().serialize(&mut out).unwrap();
        assert_eq!(
            out,
            vec![0, 4, 5, 0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 1, b'a']
        );
    }

    #[test]
    fn modified_utf8() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 0xC0, 0x80, 97]);
        assert_eq!(encode_modified_utf8("foo"), vec![102, 111, 111]);
        assert_eq!(encode_modified_utf8("Ą"), vec![196, 132]);
        assert_eq!(encode_modified_utf8("ऄ"), vec![224, 164, 132]);
        for sample in ["a\x00a", "foo", "Ą", "ऄ", "\u{1F600}"] {
            assert_eq!(modified_utf8_len(sample), encode_modified_utf8(sample).len());
        }
        assert_eq!(
            encode_modified_utf8("\u{10000}\u{10FFFF}"),
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
    }
}
