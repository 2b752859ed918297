use crate::jvm::class_file::{
    Attribute, Code, ConstantsReader, Parse, Serialize, Utf8ConstantIndex,
};
use crate::jvm::{parse_descriptor, BinaryName, Error, MethodAccessFlags, MethodDescriptor};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name<'a>(&self, constants: &'a impl ConstantsReader) -> Result<&'a str, Error> {
        constants.utf8(self.name_index)
    }

    pub fn descriptor(
        &self,
        constants: &impl ConstantsReader,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        parse_descriptor(constants.utf8(self.descriptor_index)?)
    }

    /// Position of the `Code` attribute in the attribute list (abstract and native methods have
    /// none)
    pub fn code_attribute_position(
        &self,
        constants: &impl ConstantsReader,
    ) -> Result<Option<usize>, Error> {
        for (position, attribute) in self.attributes.iter().enumerate() {
            if attribute.is::<Code>(constants)? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Parse the `Code` attribute, if there is one
    pub fn code(&self, constants: &impl ConstantsReader) -> Result<Option<Code>, Error> {
        match self.code_attribute_position(constants)? {
            None => Ok(None),
            Some(position) => self.attributes[position].decode().map(Some),
        }
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Method {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}
