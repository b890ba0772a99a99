//! Instructions as the assembler accepts them
//!
//! The representation is a little more convenient than the raw opcode list:
//!
//!   - `wide` never shows up: loads, stores, `iinc`, and `ret` switch to their wide encodings
//!     when their operands require it
//!
//!   - short forms (`iload_0`, `ldc` vs `ldc_w`, etc.) are picked automatically
//!
//!   - families of instructions that only differ by a condition or mode are merged into one
//!     variant with a field, which makes inverting branch conditions trivial
//!
//! Straight-line instructions are [`Instruction`]s. Anything that jumps or ends a block is a
//! [`BranchInstruction`], except for switches which get built with a [`super::SwitchBuilder`].

use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, ConstantsPool, ConstantsWriter, FieldRefConstantIndex,
    MethodRefConstantIndex, Serialize,
};
use crate::jvm::{
    BaseType, ConstantData, Error, FieldRef, MethodRef, RefType, MAX_ARRAY_DIMENSIONS,
};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::Result as IoResult;
use std::ops::Not;

/// Prefix for instructions with 16-bit local indices (or a 16-bit `iinc` increment)
pub const WIDE: u8 = 0xc4;

/// Non-branching JVM bytecode instruction
///
/// The type parameters abstract over how symbolic operands are represented. Callers build
/// instructions with the defaults (names and descriptors), and the code buffer resolves them
/// into a [`SerializableInstruction`] holding constant pool indices.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction<
    Class = RefType,
    Constant = ConstantData,
    Field = FieldRef,
    Method = MethodRef,
> {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant),  // covers both `ldc` and `ldc_w`
    Ldc2(Constant), // `ldc2_w`
    ILoad(u16),     // covers `iload`, `iload_{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore_{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishl`, `ishr`, and `iushr`
    LSh(ShiftType), // covers `lshl`, `lshr`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(Field),
    PutStatic(Field),
    GetField(Field),
    PutField(Field),
    Invoke(InvokeType, Method),
    New(Class),
    NewArray(BaseType),
    ANewArray(Class),
    ArrayLength,
    CheckCast(Class),
    InstanceOf(Class),
    MonitorEnter,
    MonitorExit,

    /// Class is the full array type, followed by how many dimensions to allocate
    MultiANewArray(Class, u8),
}

/// Method reference along with the operand-stack size of its arguments (needed by
/// `invokeinterface`)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvokeTarget {
    pub method: MethodRefConstantIndex,
    pub argument_slots: u8,
}

pub type SerializableInstruction =
    Instruction<ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeTarget>;

/// Net change an instruction makes to the operand stack, in slots
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    pub const fn new(pops: usize, pushes: usize) -> StackEffect {
        StackEffect { pops, pushes }
    }
}

/// How an instruction uses a local variable slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocalAccess {
    Load { slot: u16, width: usize },
    Store { slot: u16, width: usize },

    /// `iinc` reads and writes a 1-slot `int`
    Increment { slot: u16 },
}

impl Instruction {
    /// Static stack effect of the instruction
    ///
    /// Field and method instructions derive their effect from the descriptors they reference.
    pub fn stack_effect(&self) -> StackEffect {
        use Instruction::*;
        let (pops, pushes) = match self {
            Nop | IInc(_, _) => (0, 0),
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
                (0, 1)
            }
            FConst0 | FConst1 | FConst2 | BiPush(_) | SiPush(_) => (0, 1),
            LConst0 | LConst1 | DConst0 | DConst1 | Ldc2(_) => (0, 2),
            Ldc(constant) => (0, if constant.is_wide() { 2 } else { 1 }),
            ILoad(_) | FLoad(_) | ALoad(_) => (0, 1),
            LLoad(_) | DLoad(_) => (0, 2),
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
            LALoad | DALoad => (2, 2),
            IStore(_) | FStore(_) | AStore(_) => (1, 0),
            LStore(_) | DStore(_) => (2, 0),
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
            LAStore | DAStore => (4, 0),
            Pop => (1, 0),
            Pop2 => (2, 0),
            Dup => (1, 2),
            DupX1 => (2, 3),
            DupX2 => (3, 4),
            Dup2 => (2, 4),
            Dup2X1 => (3, 5),
            Dup2X2 => (4, 6),
            Swap => (2, 2),
            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => (2, 1),
            FAdd | FSub | FMul | FDiv | FRem => (2, 1),
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => (4, 2),
            DAdd | DSub | DMul | DDiv | DRem => (4, 2),
            LSh(_) => (3, 2),
            INeg | FNeg => (1, 1),
            LNeg | DNeg => (2, 2),
            I2F | F2I | I2B | I2C | I2S => (1, 1),
            I2L | I2D | F2L | F2D => (1, 2),
            L2I | L2F | D2I | D2F => (2, 1),
            L2D | D2L => (2, 2),
            LCmp => (4, 1),
            FCmp(_) => (2, 1),
            DCmp(_) => (4, 1),
            GetStatic(field) => (0, field.descriptor.width()),
            PutStatic(field) => (field.descriptor.width(), 0),
            GetField(field) => (1, field.descriptor.width()),
            PutField(field) => (1 + field.descriptor.width(), 0),
            Invoke(typ, method) => {
                let has_this = !matches!(typ, InvokeType::Static);
                (
                    method.descriptor.parameter_length(has_this),
                    method.descriptor.return_width(),
                )
            }
            New(_) => (0, 1),
            NewArray(_) | ANewArray(_) | ArrayLength | CheckCast(_) | InstanceOf(_) => (1, 1),
            MonitorEnter | MonitorExit => (1, 0),
            MultiANewArray(_, dimensions) => (*dimensions as usize, 1),
        };
        StackEffect::new(pops, pushes)
    }

    /// Local variable accessed by the instruction, if any
    pub fn local_access(&self) -> Option<LocalAccess> {
        use Instruction::*;
        let access = match self {
            ILoad(slot) | FLoad(slot) | ALoad(slot) => LocalAccess::Load {
                slot: *slot,
                width: 1,
            },
            LLoad(slot) | DLoad(slot) => LocalAccess::Load {
                slot: *slot,
                width: 2,
            },
            IStore(slot) | FStore(slot) | AStore(slot) => LocalAccess::Store {
                slot: *slot,
                width: 1,
            },
            LStore(slot) | DStore(slot) => LocalAccess::Store {
                slot: *slot,
                width: 2,
            },
            IInc(slot, _) => LocalAccess::Increment { slot: *slot },
            _ => return None,
        };
        Some(access)
    }

    /// Resolve symbolic operands into constant pool indices
    ///
    /// `ldc` and `ldc2_w` are normalized so that wide constants always use `ldc2_w`.
    pub fn resolve(&self, constants: &mut ConstantsPool) -> Result<SerializableInstruction, Error> {
        use Instruction::*;
        Ok(match self {
            Nop => Nop,
            AConstNull => AConstNull,
            IConstM1 => IConstM1,
            IConst0 => IConst0,
            IConst1 => IConst1,
            IConst2 => IConst2,
            IConst3 => IConst3,
            IConst4 => IConst4,
            IConst5 => IConst5,
            LConst0 => LConst0,
            LConst1 => LConst1,
            FConst0 => FConst0,
            FConst1 => FConst1,
            FConst2 => FConst2,
            DConst0 => DConst0,
            DConst1 => DConst1,
            BiPush(b) => BiPush(*b),
            SiPush(s) => SiPush(*s),
            Ldc(constant) | Ldc2(constant) => {
                let index = constant.constant_index(constants)?;
                if constant.is_wide() {
                    Ldc2(index)
                } else {
                    Ldc(index)
                }
            }
            ILoad(idx) => ILoad(*idx),
            LLoad(idx) => LLoad(*idx),
            FLoad(idx) => FLoad(*idx),
            DLoad(idx) => DLoad(*idx),
            ALoad(idx) => ALoad(*idx),
            IALoad => IALoad,
            LALoad => LALoad,
            FALoad => FALoad,
            DALoad => DALoad,
            AALoad => AALoad,
            BALoad => BALoad,
            CALoad => CALoad,
            SALoad => SALoad,
            IStore(idx) => IStore(*idx),
            LStore(idx) => LStore(*idx),
            FStore(idx) => FStore(*idx),
            DStore(idx) => DStore(*idx),
            AStore(idx) => AStore(*idx),
            IAStore => IAStore,
            LAStore => LAStore,
            FAStore => FAStore,
            DAStore => DAStore,
            AAStore => AAStore,
            BAStore => BAStore,
            CAStore => CAStore,
            SAStore => SAStore,
            Pop => Pop,
            Pop2 => Pop2,
            Dup => Dup,
            DupX1 => DupX1,
            DupX2 => DupX2,
            Dup2 => Dup2,
            Dup2X1 => Dup2X1,
            Dup2X2 => Dup2X2,
            Swap => Swap,
            IAdd => IAdd,
            LAdd => LAdd,
            FAdd => FAdd,
            DAdd => DAdd,
            ISub => ISub,
            LSub => LSub,
            FSub => FSub,
            DSub => DSub,
            IMul => IMul,
            LMul => LMul,
            FMul => FMul,
            DMul => DMul,
            IDiv => IDiv,
            LDiv => LDiv,
            FDiv => FDiv,
            DDiv => DDiv,
            IRem => IRem,
            LRem => LRem,
            FRem => FRem,
            DRem => DRem,
            INeg => INeg,
            LNeg => LNeg,
            FNeg => FNeg,
            DNeg => DNeg,
            ISh(s) => ISh(*s),
            LSh(s) => LSh(*s),
            IAnd => IAnd,
            LAnd => LAnd,
            IOr => IOr,
            LOr => LOr,
            IXor => IXor,
            LXor => LXor,
            IInc(idx, by) => IInc(*idx, *by),
            I2L => I2L,
            I2F => I2F,
            I2D => I2D,
            L2I => L2I,
            L2F => L2F,
            L2D => L2D,
            F2I => F2I,
            F2L => F2L,
            F2D => F2D,
            D2I => D2I,
            D2L => D2L,
            D2F => D2F,
            I2B => I2B,
            I2C => I2C,
            I2S => I2S,
            LCmp => LCmp,
            FCmp(m) => FCmp(*m),
            DCmp(m) => DCmp(*m),
            GetStatic(field) => GetStatic(field.constant_index(constants)?),
            PutStatic(field) => PutStatic(field.constant_index(constants)?),
            GetField(field) => GetField(field.constant_index(constants)?),
            PutField(field) => PutField(field.constant_index(constants)?),
            Invoke(typ, method) => {
                let has_this = !matches!(typ, InvokeType::Static);
                let argument_slots = method.descriptor.parameter_length(has_this);
                let argument_slots = u8::try_from(argument_slots).map_err(|_| {
                    Error::BadDescriptor(format!(
                        "method '{}' takes {} argument slots (limit is 255)",
                        method.name, argument_slots
                    ))
                })?;
                let target = InvokeTarget {
                    method: method.constant_index(constants)?,
                    argument_slots,
                };
                Invoke(*typ, target)
            }
            New(class) => New(class.constant_index(constants)?),
            NewArray(base_type) => NewArray(*base_type),
            ANewArray(class) => {
                // The allocated array has one more dimension than its component class
                let dimensions = class.dimensions() + 1;
                if dimensions > MAX_ARRAY_DIMENSIONS {
                    return Err(Error::ArrayDimensionsOverflow(dimensions));
                }
                ANewArray(class.constant_index(constants)?)
            }
            ArrayLength => ArrayLength,
            CheckCast(class) => CheckCast(class.constant_index(constants)?),
            InstanceOf(class) => InstanceOf(class.constant_index(constants)?),
            MonitorEnter => MonitorEnter,
            MonitorExit => MonitorExit,
            MultiANewArray(class, dimensions) => {
                if *dimensions == 0 || *dimensions as usize > class.dimensions() {
                    return Err(Error::BadDescriptor(format!(
                        "cannot allocate {} dimensions of '{}'",
                        dimensions,
                        class.class_name()
                    )));
                }
                MultiANewArray(class.constant_index(constants)?, *dimensions)
            }
        })
    }
}

impl SerializableInstruction {
    /// Opcode of instructions whose encoding is a single byte
    fn single_byte_opcode(&self) -> Option<u8> {
        use Instruction::*;
        let opcode = match self {
            Nop => 0x00,
            AConstNull => 0x01,
            IConstM1 => 0x02,
            IConst0 => 0x03,
            IConst1 => 0x04,
            IConst2 => 0x05,
            IConst3 => 0x06,
            IConst4 => 0x07,
            IConst5 => 0x08,
            LConst0 => 0x09,
            LConst1 => 0x0a,
            FConst0 => 0x0b,
            FConst1 => 0x0c,
            FConst2 => 0x0d,
            DConst0 => 0x0e,
            DConst1 => 0x0f,
            IALoad => 0x2e,
            LALoad => 0x2f,
            FALoad => 0x30,
            DALoad => 0x31,
            AALoad => 0x32,
            BALoad => 0x33,
            CALoad => 0x34,
            SALoad => 0x35,
            IAStore => 0x4f,
            LAStore => 0x50,
            FAStore => 0x51,
            DAStore => 0x52,
            AAStore => 0x53,
            BAStore => 0x54,
            CAStore => 0x55,
            SAStore => 0x56,
            Pop => 0x57,
            Pop2 => 0x58,
            Dup => 0x59,
            DupX1 => 0x5a,
            DupX2 => 0x5b,
            Dup2 => 0x5c,
            Dup2X1 => 0x5d,
            Dup2X2 => 0x5e,
            Swap => 0x5f,
            IAdd => 0x60,
            LAdd => 0x61,
            FAdd => 0x62,
            DAdd => 0x63,
            ISub => 0x64,
            LSub => 0x65,
            FSub => 0x66,
            DSub => 0x67,
            IMul => 0x68,
            LMul => 0x69,
            FMul => 0x6a,
            DMul => 0x6b,
            IDiv => 0x6c,
            LDiv => 0x6d,
            FDiv => 0x6e,
            DDiv => 0x6f,
            IRem => 0x70,
            LRem => 0x71,
            FRem => 0x72,
            DRem => 0x73,
            INeg => 0x74,
            LNeg => 0x75,
            FNeg => 0x76,
            DNeg => 0x77,
            ISh(ShiftType::Left) => 0x78,
            LSh(ShiftType::Left) => 0x79,
            ISh(ShiftType::ArithmeticRight) => 0x7a,
            LSh(ShiftType::ArithmeticRight) => 0x7b,
            ISh(ShiftType::LogicalRight) => 0x7c,
            LSh(ShiftType::LogicalRight) => 0x7d,
            IAnd => 0x7e,
            LAnd => 0x7f,
            IOr => 0x80,
            LOr => 0x81,
            IXor => 0x82,
            LXor => 0x83,
            I2L => 0x85,
            I2F => 0x86,
            I2D => 0x87,
            L2I => 0x88,
            L2F => 0x89,
            L2D => 0x8a,
            F2I => 0x8b,
            F2L => 0x8c,
            F2D => 0x8d,
            D2I => 0x8e,
            D2L => 0x8f,
            D2F => 0x90,
            I2B => 0x91,
            I2C => 0x92,
            I2S => 0x93,
            LCmp => 0x94,
            FCmp(CompareMode::L) => 0x95,
            FCmp(CompareMode::G) => 0x96,
            DCmp(CompareMode::L) => 0x97,
            DCmp(CompareMode::G) => 0x98,
            ArrayLength => 0xbe,
            MonitorEnter => 0xc2,
            MonitorExit => 0xc3,
            _ => return None,
        };
        Some(opcode)
    }
}

/// Write a load/store/`ret` using the shortest encoding that fits the slot
///
/// `short_forms` is the opcode for slot 0 of the `_0` to `_3` family, if there is one.
pub(crate) fn serialize_local<W: WriteBytesExt>(
    slot: u16,
    short_forms: Option<u8>,
    normal_form: u8,
    writer: &mut W,
) -> IoResult<()> {
    match (u8::try_from(slot), short_forms) {
        (Ok(n @ 0..=3), Some(short_form_start)) => (short_form_start + n).serialize(writer),
        (Ok(n), _) => {
            normal_form.serialize(writer)?;
            n.serialize(writer)
        }
        (Err(_), _) => {
            WIDE.serialize(writer)?;
            normal_form.serialize(writer)?;
            slot.serialize(writer)
        }
    }
}

impl Serialize for SerializableInstruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        use Instruction::*;

        if let Some(opcode) = self.single_byte_opcode() {
            return opcode.serialize(writer);
        }

        /// Opcode followed by a `u16` constant pool index
        fn with_index<W: WriteBytesExt>(opcode: u8, index: u16, writer: &mut W) -> IoResult<()> {
            opcode.serialize(writer)?;
            index.serialize(writer)
        }

        match self {
            BiPush(b) => {
                0x10u8.serialize(writer)?;
                b.serialize(writer)
            }
            SiPush(s) => {
                0x11u8.serialize(writer)?;
                s.serialize(writer)
            }
            Ldc(ConstantIndex(idx)) => match u8::try_from(*idx) {
                Ok(b) => {
                    0x12u8.serialize(writer)?;
                    b.serialize(writer)
                }
                Err(_) => with_index(0x13, *idx, writer),
            },
            Ldc2(ConstantIndex(idx)) => with_index(0x14, *idx, writer),
            ILoad(idx) => serialize_local(*idx, Some(0x1a), 0x15, writer),
            LLoad(idx) => serialize_local(*idx, Some(0x1e), 0x16, writer),
            FLoad(idx) => serialize_local(*idx, Some(0x22), 0x17, writer),
            DLoad(idx) => serialize_local(*idx, Some(0x26), 0x18, writer),
            ALoad(idx) => serialize_local(*idx, Some(0x2a), 0x19, writer),
            IStore(idx) => serialize_local(*idx, Some(0x3b), 0x36, writer),
            LStore(idx) => serialize_local(*idx, Some(0x3f), 0x37, writer),
            FStore(idx) => serialize_local(*idx, Some(0x43), 0x38, writer),
            DStore(idx) => serialize_local(*idx, Some(0x47), 0x39, writer),
            AStore(idx) => serialize_local(*idx, Some(0x4b), 0x3a, writer),
            IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => {
                    0x84u8.serialize(writer)?;
                    b.serialize(writer)?;
                    d.serialize(writer)
                }
                _ => {
                    WIDE.serialize(writer)?;
                    0x84u8.serialize(writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)
                }
            },
            GetStatic(field) => with_index(0xb2, (field.0).0, writer),
            PutStatic(field) => with_index(0xb3, (field.0).0, writer),
            GetField(field) => with_index(0xb4, (field.0).0, writer),
            PutField(field) => with_index(0xb5, (field.0).0, writer),
            Invoke(typ, target) => {
                let index = (target.method.0).0;
                match typ {
                    InvokeType::Virtual => with_index(0xb6, index, writer),
                    InvokeType::Special => with_index(0xb7, index, writer),
                    InvokeType::Static => with_index(0xb8, index, writer),
                    InvokeType::Interface => {
                        with_index(0xb9, index, writer)?;
                        target.argument_slots.serialize(writer)?;
                        0u8.serialize(writer)
                    }
                }
            }
            New(class) => with_index(0xbb, (class.0).0, writer),
            NewArray(base_type) => {
                0xbcu8.serialize(writer)?;
                base_type.array_type_code().serialize(writer)
            }
            ANewArray(class) => with_index(0xbd, (class.0).0, writer),
            CheckCast(class) => with_index(0xc0, (class.0).0, writer),
            InstanceOf(class) => with_index(0xc1, (class.0).0, writer),
            MultiANewArray(class, dimensions) => {
                with_index(0xc5, (class.0).0, writer)?;
                dimensions.serialize(writer)
            }
            _ => unreachable!("single byte instructions are handled above"),
        }
    }
}

/// Branching JVM bytecode instruction
///
/// `Lbl` is the representation of jump targets. Callers use [`super::Label`]s, and the layout
/// pass decides which jumps fit in a signed 16-bit offset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),

    /// `goto_w`, even if the jump would fit in `goto`
    GotoW(Lbl),
    Jsr(Lbl),

    /// `jsr_w`, even if the jump would fit in `jsr`
    JsrW(Lbl),

    /// Return from subroutine, with the return address in a local (covers `wide ret`)
    Ret(u16),
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

/// How a branch instruction relates to the layout pass
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JumpKind {
    /// `goto` (widens to `goto_w`)
    Goto,

    /// `jsr` (widens to `jsr_w`)
    Jsr,

    /// `if*` (widens to the inverted condition jumping over a `goto_w`)
    Conditional,

    /// `goto_w` or `jsr_w`: never needs widening
    Wide,
}

impl<Lbl: Copy> BranchInstruction<Lbl> {
    /// Label jumped to, if any
    pub fn jump_target(&self) -> Option<Lbl> {
        use BranchInstruction::*;
        match self {
            If(_, lbl) | IfICmp(_, lbl) | IfACmp(_, lbl) | IfNull(_, lbl) => Some(*lbl),
            Goto(lbl) | GotoW(lbl) | Jsr(lbl) | JsrW(lbl) => Some(*lbl),
            Ret(_) | IReturn | LReturn | FReturn | DReturn | AReturn | Return | AThrow => None,
        }
    }

    /// Whether execution can continue with the next instruction
    ///
    /// `jsr` counts as falling through since the subroutine returns to the next instruction.
    pub fn falls_through(&self) -> bool {
        use BranchInstruction::*;
        match self {
            If(..) | IfICmp(..) | IfACmp(..) | IfNull(..) | Jsr(_) | JsrW(_) => true,
            Goto(_) | GotoW(_) | Ret(_) | IReturn | LReturn | FReturn | DReturn | AReturn
            | Return | AThrow => false,
        }
    }

    pub fn jump_kind(&self) -> Option<JumpKind> {
        use BranchInstruction::*;
        match self {
            If(..) | IfICmp(..) | IfACmp(..) | IfNull(..) => Some(JumpKind::Conditional),
            Goto(_) => Some(JumpKind::Goto),
            Jsr(_) => Some(JumpKind::Jsr),
            GotoW(_) | JsrW(_) => Some(JumpKind::Wide),
            Ret(_) | IReturn | LReturn | FReturn | DReturn | AReturn | Return | AThrow => None,
        }
    }

    pub fn stack_effect(&self) -> StackEffect {
        use BranchInstruction::*;
        let (pops, pushes) = match self {
            If(..) | IfNull(..) | IReturn | FReturn | AReturn | AThrow => (1, 0),
            IfICmp(..) | IfACmp(..) | LReturn | DReturn => (2, 0),
            Goto(_) | GotoW(_) | Ret(_) | Return => (0, 0),

            // The return address is only pushed for the subroutine
            Jsr(_) | JsrW(_) => (0, 0),
        };
        StackEffect::new(pops, pushes)
    }

    /// Opcode, using the short form for jumps
    pub fn opcode(&self) -> u8 {
        use BranchInstruction::*;
        match self {
            If(op, _) => 0x99 + op.opcode_offset(),
            IfICmp(op, _) => 0x9f + op.opcode_offset(),
            IfACmp(EqComparison::EQ, _) => 0xa5,
            IfACmp(EqComparison::NE, _) => 0xa6,
            Goto(_) => 0xa7,
            Jsr(_) => 0xa8,
            Ret(_) => 0xa9,
            IReturn => 0xac,
            LReturn => 0xad,
            FReturn => 0xae,
            DReturn => 0xaf,
            AReturn => 0xb0,
            Return => 0xb1,
            AThrow => 0xbf,
            IfNull(EqComparison::EQ, _) => 0xc6,
            IfNull(EqComparison::NE, _) => 0xc7,
            GotoW(_) => 0xc8,
            JsrW(_) => 0xc9,
        }
    }

    /// Change the representation of the jump target
    pub fn map_label<Lbl2>(&self, f: impl FnOnce(Lbl) -> Lbl2) -> BranchInstruction<Lbl2> {
        use BranchInstruction::*;
        match *self {
            If(op, lbl) => If(op, f(lbl)),
            IfICmp(op, lbl) => IfICmp(op, f(lbl)),
            IfACmp(op, lbl) => IfACmp(op, f(lbl)),
            IfNull(op, lbl) => IfNull(op, f(lbl)),
            Goto(lbl) => Goto(f(lbl)),
            GotoW(lbl) => GotoW(f(lbl)),
            Jsr(lbl) => Jsr(f(lbl)),
            JsrW(lbl) => JsrW(f(lbl)),
            Ret(slot) => Ret(slot),
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        }
    }

    /// Flip the condition of a conditional branch
    ///
    /// Unconditional instructions are returned unchanged.
    pub fn invert_condition(&self) -> BranchInstruction<Lbl> {
        use BranchInstruction::*;
        match *self {
            If(op, lbl) => If(!op, lbl),
            IfICmp(op, lbl) => IfICmp(!op, lbl),
            IfACmp(op, lbl) => IfACmp(!op, lbl),
            IfNull(op, lbl) => IfNull(!op, lbl),
            other => other,
        }
    }
}

/// Shift direction/mode
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    NE,
    LT,
    GE,
    GT,
    LE,
}

impl OrdComparison {
    /// Position within the `ifeq`/`if_icmpeq` opcode families
    fn opcode_offset(self) -> u8 {
        match self {
            OrdComparison::EQ => 0,
            OrdComparison::NE => 1,
            OrdComparison::LT => 2,
            OrdComparison::GE => 3,
            OrdComparison::GT => 4,
            OrdComparison::LE => 5,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::NE => OrdComparison::EQ,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
///
/// The argument count `invokeinterface` needs is computed from the method descriptor.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}
