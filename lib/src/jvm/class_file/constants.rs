use crate::jvm::class_file::{parse_bytes, Parse, Serialize};
use crate::jvm::{parse_descriptor, BinaryName, Error, ParseDescriptor, RefType};
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for Constant {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let constant = match u8::parse(reader)? {
            1 => {
                let len = u16::parse(reader)?;
                let bytes = parse_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(reader.read_i32::<BigEndian>()?),
            4 => Constant::Float(f32::from_bits(reader.read_u32::<BigEndian>()?)),
            5 => Constant::Long(reader.read_i64::<BigEndian>()?),
            6 => Constant::Double(f64::from_bits(reader.read_u64::<BigEndian>()?)),
            7 => Constant::Class(Utf8ConstantIndex(ConstantIndex::parse(reader)?)),
            8 => Constant::String(Utf8ConstantIndex(ConstantIndex::parse(reader)?)),
            9 => Constant::FieldRef(
                ClassConstantIndex(ConstantIndex::parse(reader)?),
                NameAndTypeConstantIndex(ConstantIndex::parse(reader)?),
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex(ConstantIndex::parse(reader)?),
                name_and_type: NameAndTypeConstantIndex(ConstantIndex::parse(reader)?),
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex(ConstantIndex::parse(reader)?),
                descriptor: Utf8ConstantIndex(ConstantIndex::parse(reader)?),
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::parse(reader)?,
                member: ConstantIndex::parse(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex(ConstantIndex::parse(reader)?),
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: NameAndTypeConstantIndex(ConstantIndex::parse(reader)?),
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::parse(reader)?,
                method_descriptor: NameAndTypeConstantIndex(ConstantIndex::parse(reader)?),
            },
            19 => Constant::Module(Utf8ConstantIndex(ConstantIndex::parse(reader)?)),
            20 => Constant::Package(Utf8ConstantIndex(ConstantIndex::parse(reader)?)),
            tag => return Err(Error::Malformed(format!("unknown constant tag {}", tag))),
        };
        Ok(constant)
    }
}

/// The constant pool count is one more than the largest index, and long/double constants
/// take up two indices.
impl Parse for OffsetVec<Constant> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::parse(reader)?);
        }
        if constants.offset_len().0 != count {
            return Err(Error::Malformed(String::from(
                "wide constant overruns the constant pool",
            )));
        }
        Ok(constants)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x1F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Surrogate pairs are recombined into supplementary characters. Strings containing an unpaired
/// surrogate have no `String` representation and are rejected.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    let malformed = || Error::Malformed(String::from("invalid modified UTF-8 string"));

    // Decode into UTF-16 code units first
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b0) = iter.next() {
        let unit = if b0 & 0b1000_0000 == 0 && b0 != 0 {
            b0 as u16
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            let b1 = iter.next().ok_or_else(malformed)?;
            if b1 & 0b1100_0000 != 0b1000_0000 {
                return Err(malformed());
            }
            ((b0 & 0x1F) as u16) << 6 | (b1 & 0x3F) as u16
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            let b1 = iter.next().ok_or_else(malformed)?;
            let b2 = iter.next().ok_or_else(malformed)?;
            if b1 & 0b1100_0000 != 0b1000_0000 || b2 & 0b1100_0000 != 0b1000_0000 {
                return Err(malformed());
            }
            ((b0 & 0x0F) as u16) << 12 | ((b1 & 0x3F) as u16) << 6 | (b2 & 0x3F) as u16
        } else {
            return Err(malformed());
        };
        units.push(unit);
    }

    String::from_utf16(&units).map_err(|_| malformed())
}

#[cfg(test)]
mod modified_utf8_tests {
    use super::*;

    #[test]
    fn containing_null_byte() {
        assert_eq!(encode_modified_utf8("a\x00a"), vec![97, 192, 128, 97]);
        assert_eq!(decode_modified_utf8(&[97, 192, 128, 97]).unwrap(), "a\x00a");
    }

    #[test]
    fn raw_null_byte_is_rejected() {
        assert!(decode_modified_utf8(&[97, 0, 97]).is_err());
    }

    #[test]
    fn two_and_three_byte_encodings() {
        let accented = "ĄǍǞǠǺȀȂȦȺӐӒ";
        let encoded = encode_modified_utf8(accented);
        assert_eq!(&encoded[..4], &[196, 132, 199, 141]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), accented);

        let devanagari = "ऄअॲ";
        let encoded = encode_modified_utf8(devanagari);
        assert_eq!(encoded, vec![224, 164, 132, 224, 164, 133, 224, 165, 178]);
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), devanagari);
    }

    #[test]
    fn supplementary_characters() {
        let encoded = encode_modified_utf8("\u{10000}\u{10FFFF}");
        assert_eq!(
            encoded,
            vec![237, 160, 128, 237, 176, 128, 237, 175, 191, 237, 191, 191]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "\u{10000}\u{10FFFF}");
    }

    #[test]
    fn unpaired_surrogate_is_rejected() {
        assert!(decode_modified_utf8(&[237, 160, 128]).is_err());
    }

    #[test]
    fn truncated_sequence_is_rejected() {
        assert!(decode_modified_utf8(&[224, 164]).is_err());
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct InvokeDynamicConstantIndex(pub ConstantIndex);

macro_rules! constant_index {
    ($index:ident) => {
        impl From<$index> for ConstantIndex {
            fn from(index: $index) -> ConstantIndex {
                index.0
            }
        }

        impl Serialize for $index {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Parse for $index {
            fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                Ok($index(ConstantIndex::parse(reader)?))
            }
        }
    };
}

constant_index!(Utf8ConstantIndex);
constant_index!(StringConstantIndex);
constant_index!(NameAndTypeConstantIndex);
constant_index!(ClassConstantIndex);
constant_index!(FieldRefConstantIndex);
constant_index!(MethodRefConstantIndex);
constant_index!(InvokeDynamicConstantIndex);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for ConstantIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::parse(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Parse for HandleKind {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::parse(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::Malformed(format!(
                    "unknown method handle kind {}",
                    other
                )))
            }
        })
    }
}

/// Typed lookups into a constant table
///
/// Every lookup checks that the index points at a constant of the expected kind.
pub trait ConstantsReader {
    fn constant_table(&self) -> &OffsetVec<Constant>;

    fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        match self.constant_table().get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => {
                Err(Error::MissingConstant(index.0))
            }
        }
    }

    fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(bad_constant(index.0, "Utf8")),
        }
    }

    /// Name of the class or interface a `CONSTANT_Class` refers to (fails for array types)
    fn binary_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        match self.class_type(index)? {
            RefType::Object(name) => Ok(name),
            _ => Err(bad_constant(index.0, "Class (not an array)")),
        }
    }

    /// Type a `CONSTANT_Class` refers to
    fn class_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = match self.constant(index.0)? {
            Constant::Class(name) => *name,
            _ => return Err(bad_constant(index.0, "Class")),
        };
        let name = self.utf8(name)?;
        RefType::from_class_name(name)
            .map_err(|err| Error::InvalidName(format!("{:?}: {}", name, err)))
    }

    fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(bad_constant(index.0, "NameAndType")),
        }
    }

    /// Parse the descriptor out of a `NameAndType`
    fn name_and_descriptor<D: ParseDescriptor>(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(String, D), Error> {
        let (name, descriptor) = self.name_and_type(index)?;
        Ok((name.to_owned(), parse_descriptor(descriptor)?))
    }
}

fn bad_constant(index: ConstantIndex, expected: &'static str) -> Error {
    Error::BadConstant {
        index: index.0,
        expected,
    }
}

impl ConstantsReader for OffsetVec<Constant> {
    fn constant_table(&self) -> &OffsetVec<Constant> {
        self
    }
}
