//! Minimal class file reader, so tests can check what the assembler wrote

#![allow(dead_code)]

use byteorder::{BigEndian, ReadBytesExt};
use classfile_assembler::jvm::code::decode::{decode_code, DecodedInstruction};
use std::io::{Cursor, Read, Result};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug, PartialEq)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),

    /// Second slot of a long or double
    Unusable,
}

#[derive(Debug)]
pub struct Attribute {
    pub name: String,
    pub info: Vec<u8>,
}

#[derive(Debug)]
pub struct Member {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<HandlerEntry>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug)]
pub struct ParsedClass {
    pub minor_version: u16,
    pub major_version: u16,

    /// Indexed by constant pool index (index 0 is unused)
    pub pool: Vec<Option<PoolEntry>>,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

fn read_utf8(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let length = cursor.read_u16::<BigEndian>()? as usize;
    let mut bytes = vec![0; length];
    cursor.read_exact(&mut bytes)?;

    // Only the ASCII subset is decoded faithfully
    Ok(bytes.iter().map(|byte| *byte as char).collect())
}

impl ParsedClass {
    pub fn parse(bytes: &[u8]) -> Result<ParsedClass> {
        let mut cursor = Cursor::new(bytes);
        assert_eq!(cursor.read_u32::<BigEndian>()?, 0xCAFEBABE);
        let minor_version = cursor.read_u16::<BigEndian>()?;
        let major_version = cursor.read_u16::<BigEndian>()?;

        let pool_count = cursor.read_u16::<BigEndian>()? as usize;
        let mut pool = vec![None];
        while pool.len() < pool_count {
            let entry = match cursor.read_u8()? {
                1 => PoolEntry::Utf8(read_utf8(&mut cursor)?),
                3 => PoolEntry::Integer(cursor.read_i32::<BigEndian>()?),
                4 => PoolEntry::Float(cursor.read_u32::<BigEndian>()?),
                5 => PoolEntry::Long(cursor.read_i64::<BigEndian>()?),
                6 => PoolEntry::Double(cursor.read_u64::<BigEndian>()?),
                7 => PoolEntry::Class(cursor.read_u16::<BigEndian>()?),
                8 => PoolEntry::String(cursor.read_u16::<BigEndian>()?),
                tag @ 9..=12 => {
                    let a = cursor.read_u16::<BigEndian>()?;
                    let b = cursor.read_u16::<BigEndian>()?;
                    match tag {
                        9 => PoolEntry::FieldRef(a, b),
                        10 => PoolEntry::MethodRef(a, b),
                        11 => PoolEntry::InterfaceMethodRef(a, b),
                        _ => PoolEntry::NameAndType(a, b),
                    }
                }
                tag => panic!("unexpected constant tag {}", tag),
            };
            let is_wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            pool.push(Some(entry));
            if is_wide {
                pool.push(Some(PoolEntry::Unusable));
            }
        }
        assert_eq!(pool.len(), pool_count);

        let mut class = ParsedClass {
            minor_version,
            major_version,
            pool,
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };
        class.access_flags = cursor.read_u16::<BigEndian>()?;
        class.this_class = cursor.read_u16::<BigEndian>()?;
        class.super_class = cursor.read_u16::<BigEndian>()?;
        for _ in 0..cursor.read_u16::<BigEndian>()? {
            class.interfaces.push(cursor.read_u16::<BigEndian>()?);
        }
        class.fields = class.read_members(&mut cursor)?;
        class.methods = class.read_members(&mut cursor)?;
        class.attributes = class.read_attributes(&mut cursor)?;
        assert_eq!(cursor.position() as usize, bytes.len(), "trailing bytes");
        Ok(class)
    }

    fn read_members(&self, cursor: &mut Cursor<&[u8]>) -> Result<Vec<Member>> {
        let count = cursor.read_u16::<BigEndian>()?;
        let mut members = vec![];
        for _ in 0..count {
            let access_flags = cursor.read_u16::<BigEndian>()?;
            let name = self.utf8(cursor.read_u16::<BigEndian>()?).to_owned();
            let descriptor = self.utf8(cursor.read_u16::<BigEndian>()?).to_owned();
            let attributes = self.read_attributes(cursor)?;
            members.push(Member {
                access_flags,
                name,
                descriptor,
                attributes,
            });
        }
        Ok(members)
    }

    fn read_attributes(&self, cursor: &mut Cursor<&[u8]>) -> Result<Vec<Attribute>> {
        let count = cursor.read_u16::<BigEndian>()?;
        let mut attributes = vec![];
        for _ in 0..count {
            let name = self.utf8(cursor.read_u16::<BigEndian>()?).to_owned();
            let length = cursor.read_u32::<BigEndian>()? as usize;
            let mut info = vec![0; length];
            cursor.read_exact(&mut info)?;
            attributes.push(Attribute { name, info });
        }
        Ok(attributes)
    }

    pub fn entry(&self, index: u16) -> &PoolEntry {
        self.pool[index as usize]
            .as_ref()
            .expect("constant pool index 0")
    }

    pub fn utf8(&self, index: u16) -> &str {
        match self.entry(index) {
            PoolEntry::Utf8(string) => string,
            other => panic!("expected utf8 at {}, found {:?}", index, other),
        }
    }

    pub fn class_name(&self, index: u16) -> &str {
        match self.entry(index) {
            PoolEntry::Class(name) => self.utf8(*name),
            other => panic!("expected class at {}, found {:?}", index, other),
        }
    }

    /// Readable rendering of a constant pool entry, following references
    pub fn describe(&self, index: u16) -> String {
        match self.entry(index) {
            PoolEntry::Utf8(string) => format!("utf8 {:?}", string),
            PoolEntry::Integer(value) => format!("int {}", value),
            PoolEntry::Float(bits) => format!("float {}", f32::from_bits(*bits)),
            PoolEntry::Long(value) => format!("long {}", value),
            PoolEntry::Double(bits) => format!("double {}", f64::from_bits(*bits)),
            PoolEntry::Class(_) => self.class_name(index).to_owned(),
            PoolEntry::String(utf8) => format!("string {:?}", self.utf8(*utf8)),
            PoolEntry::FieldRef(class, nat) | PoolEntry::MethodRef(class, nat) => {
                format!("{}.{}", self.class_name(*class), self.describe(*nat))
            }
            PoolEntry::InterfaceMethodRef(class, nat) => {
                format!("{}.{} (interface)", self.class_name(*class), self.describe(*nat))
            }
            PoolEntry::NameAndType(name, descriptor) => {
                format!("{}:{}", self.utf8(*name), self.utf8(*descriptor))
            }
            PoolEntry::Unusable => panic!("reference to the second slot of a wide constant"),
        }
    }

    /// Decode a method body, rendering constant operands symbolically and jump targets as the
    /// index of the instruction they land on (`#n`)
    pub fn render_code(&self, code: &[u8]) -> Vec<String> {
        let decoded = decode_code(code).expect("undecodable code");
        let target = |offset: &usize| -> String {
            let idx = decoded
                .iter()
                .position(|(at, _)| at == offset)
                .unwrap_or_else(|| panic!("jump into the middle of an instruction at {}", offset));
            format!("#{}", idx)
        };
        decoded
            .iter()
            .map(|(_, insn)| match insn {
                DecodedInstruction::Plain(op) => format!("{:02x}", op),
                DecodedInstruction::Immediate(op, value) => format!("{:02x} {}", op, value),
                DecodedInstruction::Local(op, slot) => format!("{:02x} local {}", op, slot),
                DecodedInstruction::IInc { slot, increment } => {
                    format!("84 local {} by {}", slot, increment)
                }
                DecodedInstruction::Constant(op, index) => {
                    format!("{:02x} {}", op, self.describe(*index))
                }
                DecodedInstruction::InvokeInterface { index, count } => {
                    format!("b9 {} count {}", self.describe(*index), count)
                }
                DecodedInstruction::MultiANewArray { index, dimensions } => {
                    format!("c5 {} dims {}", self.describe(*index), dimensions)
                }
                DecodedInstruction::Jump(op, offset) => format!("{:02x} -> {}", op, target(offset)),
                DecodedInstruction::TableSwitch {
                    default,
                    low,
                    targets,
                } => format!(
                    "aa default {} low {} [{}]",
                    target(default),
                    low,
                    targets.iter().map(target).collect::<Vec<_>>().join(" ")
                ),
                DecodedInstruction::LookupSwitch { default, pairs } => format!(
                    "ab default {} [{}]",
                    target(default),
                    pairs
                        .iter()
                        .map(|(key, offset)| format!("{}:{}", key, target(offset)))
                        .collect::<Vec<_>>()
                        .join(" ")
                ),
            })
            .collect()
    }

    pub fn method(&self, name: &str) -> &Member {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .unwrap_or_else(|| panic!("no method named {}", name))
    }

    pub fn code(&self, method: &str) -> CodeAttribute {
        let attribute = self
            .method(method)
            .attributes
            .iter()
            .find(|attribute| attribute.name == "Code")
            .expect("method has no code");
        let mut cursor = Cursor::new(&attribute.info[..]);
        self.read_code(&mut cursor).expect("malformed code attribute")
    }

    fn read_code(&self, cursor: &mut Cursor<&[u8]>) -> Result<CodeAttribute> {
        let max_stack = cursor.read_u16::<BigEndian>()?;
        let max_locals = cursor.read_u16::<BigEndian>()?;
        let length = cursor.read_u32::<BigEndian>()? as usize;
        let mut code = vec![0; length];
        cursor.read_exact(&mut code)?;
        let mut exception_table = vec![];
        for _ in 0..cursor.read_u16::<BigEndian>()? {
            exception_table.push(HandlerEntry {
                start_pc: cursor.read_u16::<BigEndian>()?,
                end_pc: cursor.read_u16::<BigEndian>()?,
                handler_pc: cursor.read_u16::<BigEndian>()?,
                catch_type: cursor.read_u16::<BigEndian>()?,
            });
        }
        let attributes = self.read_attributes(cursor)?;
        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }
}

/// Entries of a `LineNumberTable` attribute
pub fn line_numbers(attribute: &Attribute) -> Vec<(u16, u16)> {
    assert_eq!(attribute.name, "LineNumberTable");
    let mut cursor = Cursor::new(&attribute.info[..]);
    let count = cursor.read_u16::<BigEndian>().unwrap();
    (0..count)
        .map(|_| {
            let start_pc = cursor.read_u16::<BigEndian>().unwrap();
            let line = cursor.read_u16::<BigEndian>().unwrap();
            (start_pc, line)
        })
        .collect()
}
