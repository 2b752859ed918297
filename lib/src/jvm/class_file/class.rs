use crate::jvm::class_file::{
    parse::truncation_is_malformed, Attribute, ClassConstantIndex, Constant, ConstantIndex,
    ConstantsReader, Field, Method, Parse, Serialize, Version,
};
use crate::jvm::{BinaryName, ClassAccessFlags, Error};
use crate::util::OffsetVec;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);
        let class_file = ClassFile::parse_from(&mut reader).map_err(truncation_is_malformed)?;
        let consumed = reader.position() as usize;
        if consumed != bytes.len() {
            return Err(Error::Malformed(format!(
                "{} trailing bytes after class file",
                bytes.len() - consumed
            )));
        }
        Ok(class_file)
    }

    /// Read only as far as needed to find out the name of the class
    pub fn peek_class_name(bytes: &[u8]) -> Result<BinaryName, Error> {
        ClassFile::parse_name_from(&mut Cursor::new(bytes)).map_err(truncation_is_malformed)
    }

    fn parse_name_from<R: ReadBytesExt>(reader: &mut R) -> Result<BinaryName, Error> {
        ClassFile::parse_magic(reader)?;
        Version::parse(reader)?;
        let constants = OffsetVec::<Constant>::parse(reader)?;
        ClassAccessFlags::parse(reader)?;
        constants.binary_name(ClassConstantIndex::parse(reader)?)
    }

    fn parse_magic<R: ReadBytesExt>(reader: &mut R) -> Result<(), Error> {
        let magic = reader.read_u32::<BigEndian>()?;
        if magic.to_be_bytes() != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        Ok(())
    }

    fn parse_from<R: ReadBytesExt>(reader: &mut R) -> Result<ClassFile, Error> {
        ClassFile::parse_magic(reader)?;
        let version = Version::parse(reader)?;
        let constants = OffsetVec::parse(reader)?;
        let access_flags = ClassAccessFlags::parse(reader)?;
        let this_class = ClassConstantIndex::parse(reader)?;
        let super_class = match ClassConstantIndex::parse(reader)? {
            ClassConstantIndex(ConstantIndex(0)) => None,
            index => Some(index),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::parse(reader)?,
            fields: Vec::parse(reader)?,
            methods: Vec::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }

    /// Encode the class file into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    pub fn class_name(&self) -> Result<BinaryName, Error> {
        self.constants.binary_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<BinaryName>, Error> {
        self.super_class
            .map(|super_class| self.constants.binary_name(super_class))
            .transpose()
    }

    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.constants.binary_name(*interface))
            .collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = fs::File::create(path)?;
        self.serialize(&mut class_file)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        };
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
