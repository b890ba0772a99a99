use super::class_file::{
    ClassConstantIndex, ClassFile, ConstantValue, ConstantsPool, ConstantsWriter, Field, Method,
    Serialize, SourceFile, Version,
};
use super::code::{BranchInstruction, CodeBuffer, Instruction, Label, SwitchHandle};
use super::{
    BinaryName, ClassAccessFlags, ConstantData, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use crate::util::Offset;
use byteorder::WriteBytesExt;
use log::debug;
use std::collections::HashSet;

/// Most method parameter slots allowed (including `this`)
const MAX_PARAMETER_SLOTS: usize = 255;

pub struct AssemblerSettings {
    /// Class file version written in the header
    pub version: Version,

    /// Source file name, recorded in a `SourceFile` class attribute
    pub source_file: Option<String>,

    /// Write `LineNumberTable` attributes for methods that recorded line numbers
    pub emit_line_numbers: bool,
}

impl Default for AssemblerSettings {
    fn default() -> AssemblerSettings {
        AssemblerSettings {
            version: Version::default(),
            source_file: None,
            emit_line_numbers: true,
        }
    }
}

/// Builds up one class
///
/// The assembler owns the constant pool, so everything symbolic (names, descriptors, member
/// references, literals) gets interned as it is declared or emitted. Method bodies are built with
/// a [`MethodAssembler`], which borrows the class until the method is closed.
pub struct ClassAssembler {
    settings: AssemblerSettings,
    name: BinaryName,
    access_flags: ClassAccessFlags,
    constants: ConstantsPool,
    this_class: ClassConstantIndex,
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<Field>,
    methods: Vec<Method>,

    /// Name and descriptor of every field declared so far
    field_signatures: HashSet<(UnqualifiedName, String)>,

    /// Name and descriptor of every method opened or declared so far
    method_signatures: HashSet<(UnqualifiedName, String)>,

    /// Number of method bodies opened so far, used to tell their labels apart
    opened_methods: u32,
}

impl ClassAssembler {
    /// Start a new class
    ///
    /// `super_class` should only be `None` for `java/lang/Object` itself.
    pub fn new(
        name: BinaryName,
        super_class: Option<BinaryName>,
        interfaces: Vec<BinaryName>,
        access_flags: ClassAccessFlags,
        settings: AssemblerSettings,
    ) -> Result<ClassAssembler, Error> {
        if interfaces.len() > u16::MAX as usize {
            return Err(Error::TooManyEntries("interfaces"));
        }

        let mut constants = ConstantsPool::new();
        let this_class = name.constant_index(&mut constants)?;
        let super_class = super_class
            .map(|super_class| super_class.constant_index(&mut constants))
            .transpose()?;
        let interfaces = interfaces
            .iter()
            .map(|interface| interface.constant_index(&mut constants))
            .collect::<Result<_, _>>()?;

        Ok(ClassAssembler {
            settings,
            name,
            access_flags,
            constants,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods: vec![],
            field_signatures: HashSet::new(),
            method_signatures: HashSet::new(),
            opened_methods: 0,
        })
    }

    pub fn name(&self) -> &BinaryName {
        &self.name
    }

    /// Constant pool as it currently stands
    pub fn constants(&self) -> &ConstantsPool {
        &self.constants
    }

    /// Declare a field
    pub fn declare_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType,
    ) -> Result<(), Error> {
        self.push_field(access_flags, name, descriptor, None)
    }

    /// Declare a field with a `ConstantValue` attribute (used for `static final` fields)
    pub fn declare_constant_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType,
        value: ConstantData,
    ) -> Result<(), Error> {
        self.push_field(access_flags, name, descriptor, Some(value))
    }

    fn push_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType,
        value: Option<ConstantData>,
    ) -> Result<(), Error> {
        descriptor.check_dimensions()?;
        let descriptor = descriptor.render();
        if self.fields.len() >= u16::MAX as usize {
            return Err(Error::TooManyEntries("fields"));
        }
        if !self
            .field_signatures
            .insert((name.clone(), descriptor.clone()))
        {
            return Err(Error::DuplicateMember {
                name: name.as_str().to_owned(),
                descriptor,
            });
        }

        let name_index = self.constants.get_utf8(name.as_str())?;
        let descriptor_index = self.constants.get_utf8(descriptor)?;
        let mut attributes = vec![];
        if let Some(value) = value {
            let value_index = value.constant_index(&mut self.constants)?;
            attributes.push(self.constants.get_attribute(ConstantValue(value_index))?);
        }

        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }

    /// Check a method signature and reserve it
    fn reserve_method(
        &mut self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
        is_static: bool,
    ) -> Result<String, Error> {
        name.check_method_name().map_err(Error::BadName)?;
        descriptor.check_dimensions()?;
        if descriptor.parameter_length(!is_static) > MAX_PARAMETER_SLOTS {
            return Err(Error::TooManyEntries("method parameter slots"));
        }
        let rendered = descriptor.render();
        if !self
            .method_signatures
            .insert((name.clone(), rendered.clone()))
        {
            return Err(Error::DuplicateMember {
                name: name.as_str().to_owned(),
                descriptor: rendered,
            });
        }
        Ok(rendered)
    }

    fn push_method(&mut self, method: Method) -> Result<(), Error> {
        if self.methods.len() >= u16::MAX as usize {
            return Err(Error::TooManyEntries("methods"));
        }
        self.methods.push(method);
        Ok(())
    }

    /// Start the body of a method
    ///
    /// The method signature is reserved right away, even if the method never gets closed.
    pub fn open_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> Result<MethodAssembler<'_>, Error> {
        let is_static = access_flags.contains(MethodAccessFlags::STATIC);
        let rendered = self.reserve_method(&name, &descriptor, is_static)?;
        let serial = self.opened_methods;
        self.opened_methods = self.opened_methods.wrapping_add(1);
        let code = CodeBuffer::new(
            format!("{}{}", name.as_str(), rendered),
            serial,
            &descriptor,
            is_static,
        );
        Ok(MethodAssembler {
            class: self,
            access_flags,
            name,
            descriptor: rendered,
            code,
        })
    }

    /// Declare a method without a body (abstract or native)
    pub fn declare_abstract_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> Result<(), Error> {
        let is_static = access_flags.contains(MethodAccessFlags::STATIC);
        let rendered = self.reserve_method(&name, &descriptor, is_static)?;
        let name_index = self.constants.get_utf8(name.as_str())?;
        let descriptor_index = self.constants.get_utf8(rendered)?;
        self.push_method(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        })
    }

    /// Finish the class
    pub fn into_class_file(mut self) -> Result<ClassFile, Error> {
        let mut attributes = vec![];
        if let Some(source_file) = self.settings.source_file.take() {
            let source_file = self.constants.get_utf8(source_file)?;
            attributes.push(self.constants.get_attribute(SourceFile(source_file))?);
        }

        debug!(
            "assembled class '{}': {} constants, {} fields, {} methods",
            self.name.as_str(),
            self.constants.len(),
            self.fields.len(),
            self.methods.len()
        );

        Ok(ClassFile {
            version: self.settings.version,
            constants: self.constants.into_offset_vec(),
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes,
        })
    }

    /// Finish the class and write it out
    pub fn write_to<W: WriteBytesExt>(self, writer: &mut W) -> Result<(), Error> {
        self.into_class_file()?.serialize(writer)?;
        Ok(())
    }

    /// Finish the class and serialize it into bytes
    pub fn to_bytes(self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Builds up the body of one method
///
/// Labels and switch handles are only meaningful within the method that produced them. The
/// method only gets added to the class by [`MethodAssembler::close`].
pub struct MethodAssembler<'a> {
    class: &'a mut ClassAssembler,
    access_flags: MethodAccessFlags,
    name: UnqualifiedName,
    descriptor: String,
    code: CodeBuffer,
}

impl<'a> MethodAssembler<'a> {
    /// Emit a non-branching instruction
    pub fn emit(&mut self, insn: Instruction) -> Result<(), Error> {
        self.code.push_instruction(&insn, &mut self.class.constants)
    }

    /// Emit an instruction that jumps or ends a block
    pub fn emit_branch(&mut self, insn: BranchInstruction<Label>) -> Result<(), Error> {
        self.code.push_branch(insn)
    }

    pub fn fresh_label(&mut self) -> Label {
        self.code.fresh_label()
    }

    /// Bind a label to the position of the next instruction
    pub fn mark_label(&mut self, label: Label) -> Result<(), Error> {
        self.code.mark_label(label)
    }

    /// Offset of the next instruction, as long as no earlier jump needs widening
    pub fn current_offset(&self) -> Offset {
        self.code.current_offset()
    }

    /// Emit a `tableswitch` over `low..=high` (the key is popped from the stack)
    pub fn table_switch(&mut self, low: i32, high: i32) -> Result<SwitchHandle, Error> {
        self.code.table_switch(low, high)
    }

    /// Emit a `lookupswitch` that will have at most `case_count` cases
    pub fn lookup_switch(&mut self, case_count: usize) -> Result<SwitchHandle, Error> {
        self.code.lookup_switch(case_count)
    }

    pub fn switch_case(
        &mut self,
        switch: SwitchHandle,
        value: i32,
        target: Label,
    ) -> Result<(), Error> {
        self.code.switch_case(switch, value, target)
    }

    /// Route a switch key to the position of the next instruction
    pub fn mark_switch_case(&mut self, switch: SwitchHandle, value: i32) -> Result<Label, Error> {
        self.code.mark_switch_case(switch, value)
    }

    pub fn switch_default(&mut self, switch: SwitchHandle, target: Label) -> Result<(), Error> {
        self.code.switch_default(switch, target)
    }

    /// Route unmatched switch keys to the position of the next instruction
    pub fn mark_switch_default(&mut self, switch: SwitchHandle) -> Result<Label, Error> {
        self.code.mark_switch_default(switch)
    }

    /// Register an exception handler over `start..end` (`None` catches everything)
    ///
    /// When ranges overlap, the handler added first wins.
    pub fn add_exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<(), Error> {
        self.code
            .add_exception_handler(start, end, handler, catch_type, &mut self.class.constants)
    }

    /// Attribute the following instructions to a source line
    pub fn line_number(&mut self, line: u16) {
        self.code.line_number(line)
    }

    /// Push an `int` using the shortest encoding
    pub fn push_int(&mut self, value: i32) -> Result<(), Error> {
        let insn = match value {
            -1 => Instruction::IConstM1,
            0 => Instruction::IConst0,
            1 => Instruction::IConst1,
            2 => Instruction::IConst2,
            3 => Instruction::IConst3,
            4 => Instruction::IConst4,
            5 => Instruction::IConst5,
            _ if i8::MIN as i32 <= value && value <= i8::MAX as i32 => {
                Instruction::BiPush(value as i8)
            }
            _ if i16::MIN as i32 <= value && value <= i16::MAX as i32 => {
                Instruction::SiPush(value as i16)
            }
            _ => Instruction::Ldc(ConstantData::Integer(value)),
        };
        self.emit(insn)
    }

    pub fn push_long(&mut self, value: i64) -> Result<(), Error> {
        let insn = match value {
            0 => Instruction::LConst0,
            1 => Instruction::LConst1,
            _ => Instruction::Ldc2(ConstantData::Long(value)),
        };
        self.emit(insn)
    }

    /// Push a `float` (`-0.0` and NaNs are loaded from the constant pool)
    pub fn push_float(&mut self, value: f32) -> Result<(), Error> {
        let insn = if value.to_bits() == 0f32.to_bits() {
            Instruction::FConst0
        } else if value == 1.0 {
            Instruction::FConst1
        } else if value == 2.0 {
            Instruction::FConst2
        } else {
            Instruction::Ldc(ConstantData::Float(value))
        };
        self.emit(insn)
    }

    pub fn push_double(&mut self, value: f64) -> Result<(), Error> {
        let insn = if value.to_bits() == 0f64.to_bits() {
            Instruction::DConst0
        } else if value == 1.0 {
            Instruction::DConst1
        } else {
            Instruction::Ldc2(ConstantData::Double(value))
        };
        self.emit(insn)
    }

    pub fn push_string(&mut self, value: impl Into<String>) -> Result<(), Error> {
        self.emit(Instruction::Ldc(ConstantData::String(value.into())))
    }

    /// Finish the method and add it to the class
    ///
    /// `max_locals_hint` is a lower bound on the number of local slots: the actual value is also
    /// at least large enough for the parameters and every local accessed.
    pub fn close(self, max_locals_hint: u16) -> Result<(), Error> {
        let MethodAssembler {
            class,
            access_flags,
            name,
            descriptor,
            code,
        } = self;

        let code = code.finish(
            max_locals_hint,
            &mut class.constants,
            class.settings.emit_line_numbers,
        )?;
        let name_index = class.constants.get_utf8(name.as_str())?;
        let descriptor_index = class.constants.get_utf8(descriptor)?;
        let code = class.constants.get_attribute(code)?;
        class.push_method(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![code],
        })
    }
}
