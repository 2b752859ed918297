use crate::jvm::class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantPoolOverflow, ConstantsPool, ConstantsReader,
    ConstantsWriter, FieldRefConstantIndex, InvokeDynamicConstantIndex, MethodRefConstantIndex,
};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, Name, RefType, RenderDescriptor,
    UnqualifiedName,
};
use crate::util::Width;

/// Constant loaded by `ldc`, `ldc_w`, or `ldc2_w`
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantData {
    String(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(RefType<BinaryName>),

    /// `CONSTANT_MethodType`, kept as its original pool index
    MethodType(ConstantIndex),

    /// `CONSTANT_MethodHandle`, kept as its original pool index
    MethodHandle(ConstantIndex),

    /// Dynamically-computed constant, kept as its original pool index along with its type
    Dynamic(ConstantIndex, FieldType<BinaryName>),
}

impl ConstantData {
    /// Resolve a loadable constant out of a constant pool
    pub fn read(constants: &impl ConstantsReader, index: ConstantIndex) -> Result<Self, Error> {
        Ok(match constants.constant(index)? {
            Constant::String(utf8) => ConstantData::String(constants.utf8(*utf8)?.to_owned()),
            Constant::Integer(integer) => ConstantData::Integer(*integer),
            Constant::Float(float) => ConstantData::Float(*float),
            Constant::Long(long) => ConstantData::Long(*long),
            Constant::Double(double) => ConstantData::Double(*double),
            Constant::Class(_) => ConstantData::Class(constants.class_type(ClassConstantIndex(index))?),
            Constant::MethodType { .. } => ConstantData::MethodType(index),
            Constant::MethodHandle { .. } => ConstantData::MethodHandle(index),
            Constant::Dynamic { name_and_type, .. } => {
                let (_, typ) = constants.name_and_descriptor(*name_and_type)?;
                ConstantData::Dynamic(index, typ)
            }
            _ => {
                return Err(Error::BadConstant {
                    index: index.0,
                    expected: "loadable constant",
                })
            }
        })
    }

    /// Does this constant take up two stack slots (and so must be loaded with `ldc2_w`)?
    pub fn is_wide(&self) -> bool {
        match self {
            ConstantData::Long(_) | ConstantData::Double(_) => true,
            ConstantData::Dynamic(_, typ) => {
                matches!(typ, FieldType::Base(base) if base.width() == 2)
            }
            _ => false,
        }
    }
}

impl ConstantsWriter for ConstantData {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match self {
            ConstantData::String(string) => {
                let utf8 = constants.get_utf8(string.as_str())?;
                Ok(constants.get_string(utf8)?.into())
            }
            ConstantData::Integer(integer) => constants.get_integer(*integer),
            ConstantData::Float(float) => constants.get_float(*float),
            ConstantData::Long(long) => constants.get_long(*long),
            ConstantData::Double(double) => constants.get_double(*double),
            ConstantData::Class(class) => Ok(class.constant_index(constants)?.into()),
            ConstantData::MethodType(index)
            | ConstantData::MethodHandle(index)
            | ConstantData::Dynamic(index, _) => Ok(*index),
        }
    }
}

/// Field referenced by `getstatic`, `putstatic`, `getfield`, or `putfield`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

impl FieldRef {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: FieldType<BinaryName>) -> Self {
        FieldRef {
            class,
            name,
            descriptor,
        }
    }

    pub fn read(
        constants: &impl ConstantsReader,
        index: FieldRefConstantIndex,
    ) -> Result<Self, Error> {
        match constants.constant(index.0)? {
            Constant::FieldRef(class, name_and_type) => {
                let (name, descriptor) = constants.name_and_descriptor(*name_and_type)?;
                Ok(FieldRef {
                    class: constants.binary_name(*class)?,
                    name: unqualified_name(name)?,
                    descriptor,
                })
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "Fieldref",
            }),
        }
    }
}

impl ConstantsWriter<FieldRefConstantIndex> for FieldRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.class.constant_index(constants)?;
        let name = constants.get_utf8(self.name.as_str())?;
        let descriptor = constants.get_utf8(self.descriptor.render())?;
        let name_and_type = constants.get_name_and_type(name, descriptor)?;
        constants.get_field_ref(class, name_and_type)
    }
}

/// Method referenced by one of the `invoke*` instructions (other than `invokedynamic`)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Owner of the method (this is an array type for things like `int[].clone()`)
    pub class: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Is the owner an interface (ie. is this an `InterfaceMethodref`)?
    pub is_interface: bool,
}

impl MethodRef {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        is_interface: bool,
    ) -> Self {
        MethodRef {
            class: RefType::Object(class),
            name,
            descriptor,
            is_interface,
        }
    }

    pub fn read(
        constants: &impl ConstantsReader,
        index: MethodRefConstantIndex,
    ) -> Result<Self, Error> {
        match constants.constant(index.0)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = constants.name_and_descriptor(*name_and_type)?;
                Ok(MethodRef {
                    class: constants.class_type(*class)?,
                    name: unqualified_name(name)?,
                    descriptor,
                    is_interface: *is_interface,
                })
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "Methodref or InterfaceMethodref",
            }),
        }
    }

    /// Is this a call to a constructor?
    pub fn is_init(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

impl ConstantsWriter<MethodRefConstantIndex> for MethodRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.class.constant_index(constants)?;
        let name = constants.get_utf8(self.name.as_str())?;
        let descriptor = constants.get_utf8(self.descriptor.render())?;
        let name_and_type = constants.get_name_and_type(name, descriptor)?;
        constants.get_method_ref(class, name_and_type, self.is_interface)
    }
}

/// Call site of an `invokedynamic`
///
/// The bootstrap method table is left untouched by rewrites, so the original pool index is kept.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InvokeDynamicRef {
    pub index: InvokeDynamicConstantIndex,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl InvokeDynamicRef {
    pub fn read(
        constants: &impl ConstantsReader,
        index: InvokeDynamicConstantIndex,
    ) -> Result<Self, Error> {
        match constants.constant(index.0)? {
            Constant::InvokeDynamic {
                method_descriptor, ..
            } => {
                let (_, descriptor): (String, _) =
                    constants.name_and_descriptor(*method_descriptor)?;
                Ok(InvokeDynamicRef { index, descriptor })
            }
            _ => Err(Error::BadConstant {
                index: index.0 .0,
                expected: "InvokeDynamic",
            }),
        }
    }
}

impl ConstantsWriter<InvokeDynamicConstantIndex> for InvokeDynamicRef {
    fn constant_index(
        &self,
        _constants: &mut ConstantsPool,
    ) -> Result<InvokeDynamicConstantIndex, ConstantPoolOverflow> {
        Ok(self.index)
    }
}

fn unqualified_name(name: String) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name).map_err(Error::InvalidName)
}
