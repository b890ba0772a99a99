//! Symbolic references used by instructions, and how they are interned into the pool

use super::class_file::{
    ClassConstantIndex, ConstantIndex, ConstantsPool, ConstantsWriter, FieldRefConstantIndex,
    MethodRefConstantIndex,
};
use super::{BinaryName, Error, FieldType, MethodDescriptor, Name, RefType, RenderDescriptor};
use super::UnqualifiedName;

/// Reference to a field of some class
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Reference to a method of some class, interface, or array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: RefType,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Whether `class` is an interface (selects `InterfaceMethodref`)
    pub is_interface: bool,
}

impl FieldRef {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: FieldType) -> FieldRef {
        FieldRef {
            class,
            name,
            descriptor,
        }
    }
}

impl MethodRef {
    /// Method on a regular class
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodRef {
        MethodRef {
            class: RefType::Object(class),
            name,
            descriptor,
            is_interface: false,
        }
    }

    /// Method on an interface
    pub fn interface(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> MethodRef {
        MethodRef {
            is_interface: true,
            ..MethodRef::new(class, name, descriptor)
        }
    }
}

/// Constant that can be loaded with `ldc`, `ldc_w`, or `ldc2_w`
#[derive(Clone, PartialEq, Debug)]
pub enum ConstantData {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType),
}

impl ConstantData {
    /// Whether the constant needs `ldc2_w` (and occupies two stack slots)
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantData::Long(_) | ConstantData::Double(_))
    }
}

/// Class constants for array types use the array descriptor as their name
impl ConstantsWriter<ClassConstantIndex> for RefType {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ClassConstantIndex, Error> {
        self.check_dimensions()?;
        let name = constants.get_utf8(self.class_name())?;
        constants.get_class(name)
    }
}

impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ClassConstantIndex, Error> {
        let name = constants.get_utf8(self.as_str())?;
        constants.get_class(name)
    }
}

impl ConstantsWriter<FieldRefConstantIndex> for FieldRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<FieldRefConstantIndex, Error> {
        self.descriptor.check_dimensions()?;
        let class_idx = self.class.constant_index(constants)?;
        let name_utf8 = constants.get_utf8(self.name.as_str())?;
        let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
        let name_and_type = constants.get_name_and_type(name_utf8, desc_utf8)?;
        constants.get_field_ref(class_idx, name_and_type)
    }
}

impl ConstantsWriter<MethodRefConstantIndex> for MethodRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<MethodRefConstantIndex, Error> {
        self.name.check_method_name().map_err(Error::BadName)?;
        self.descriptor.check_dimensions()?;
        let class_idx = self.class.constant_index(constants)?;
        let name_utf8 = constants.get_utf8(self.name.as_str())?;
        let desc_utf8 = constants.get_utf8(self.descriptor.render())?;
        let name_and_type = constants.get_name_and_type(name_utf8, desc_utf8)?;
        constants.get_method_ref(class_idx, name_and_type, self.is_interface)
    }
}

impl ConstantsWriter<ConstantIndex> for ConstantData {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<ConstantIndex, Error> {
        match self {
            ConstantData::Integer(integer) => constants.get_integer(*integer),
            ConstantData::Float(float) => constants.get_float(*float),
            ConstantData::Long(long) => constants.get_long(*long),
            ConstantData::Double(double) => constants.get_double(*double),
            ConstantData::String(string) => {
                let utf8 = constants.get_utf8(string.as_str())?;
                Ok(constants.get_string(utf8)?.into())
            }
            ConstantData::Class(class) => Ok(class.constant_index(constants)?.into()),
        }
    }
}
