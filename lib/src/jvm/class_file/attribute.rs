use crate::jvm::class_file::{
    parse_bytes, ClassConstantIndex, ConstantsReader, Parse, Serialize, Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Attributes are kept as raw bytes unless something needs to look inside them (see
/// [`Attribute::decode`]), so attributes this crate knows nothing about survive a rewrite
/// untouched.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Name of the attribute
    pub fn name<'a>(&self, constants: &'a impl ConstantsReader) -> Result<&'a str, Error> {
        constants.utf8(self.name_index)
    }

    /// Check if the attribute has a given type
    pub fn is<A: AttributeLike>(&self, constants: &impl ConstantsReader) -> Result<bool, Error> {
        Ok(self.name(constants)? == A::NAME)
    }

    /// Parse the contents of the attribute
    pub fn decode<A: AttributeLike + Parse>(&self) -> Result<A, Error> {
        let mut reader = Cursor::new(&self.info[..]);
        let attribute = A::parse(&mut reader).map_err(super::parse::truncation_is_malformed)?;
        if reader.position() as usize != self.info.len() {
            return Err(Error::Malformed(format!(
                "{} attribute has trailing bytes",
                A::NAME
            )));
        }
        Ok(attribute)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Parse for Attribute {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::parse(reader)?;
        let len = u32::parse(reader)?;
        let info = parse_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Code {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Code {
            max_stack: u16::parse(reader)?,
            max_locals: u16::parse(reader)?,
            code_array: BytecodeArray::parse(reader)?,
            exception_table: Vec::parse(reader)?,
            attributes: Vec::parse(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught (index 0 catches everything)
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Parse for ExceptionHandler {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: BytecodeIndex::parse(reader)?,
            end_pc: BytecodeIndex::parse(reader)?,
            handler_pc: BytecodeIndex::parse(reader)?,
            catch_type: ClassConstantIndex::parse(reader)?,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Parse for BytecodeArray {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let len = u32::parse(reader)?;
        Ok(BytecodeArray(parse_bytes(reader, len as usize)?))
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for BytecodeIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BytecodeIndex(u16::parse(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl AttributeLike for LineNumberTable {
    const NAME: &'static str = "LineNumberTable";
}

impl Serialize for LineNumberTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for LineNumberTable {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumberTable(Vec::parse(reader)?))
    }
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)?;
        Ok(())
    }
}

impl Parse for LineNumber {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: BytecodeIndex::parse(reader)?,
            line_number: u16::parse(reader)?,
        })
    }
}

/// Entry in either a `LocalVariableTable` or a `LocalVariableTypeTable`
///
/// The layout is identical: the only difference is that `descriptor_index` points to a generic
/// signature in the type table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)?;
        Ok(())
    }
}

impl Parse for LocalVariable {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: BytecodeIndex::parse(reader)?,
            length: u16::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            index: u16::parse(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTable {
    const NAME: &'static str = "LocalVariableTable";
}

impl Serialize for LocalVariableTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for LocalVariableTable {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariableTable(Vec::parse(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.14
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableTypeTable(pub Vec<LocalVariable>);

impl AttributeLike for LocalVariableTypeTable {
    const NAME: &'static str = "LocalVariableTypeTable";
}

impl Serialize for LocalVariableTypeTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for LocalVariableTypeTable {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariableTypeTable(Vec::parse(reader)?))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<ClassConstantIndex, u16>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
        stack: Vec<VerificationType<ClassConstantIndex, u16>>,
    },
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                assert!(
                    0 < *chopped_k && *chopped_k < 4,
                    "ChopLocalsNoStack chops 1-3 locals"
                );
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                assert!(
                    0 < added_k && added_k < 4,
                    "AppendLocalsNoStack adds 1-3 locals"
                );
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;

    #[test]
    fn code_attribute_parses_back() {
        let code = Code {
            max_stack: 2,
            max_locals: 1,
            code_array: BytecodeArray(vec![0x2a, 0xb0]),
            exception_table: vec![ExceptionHandler {
                start_pc: BytecodeIndex(0),
                end_pc: BytecodeIndex(1),
                handler_pc: BytecodeIndex(1),
                catch_type: ClassConstantIndex(ConstantIndex(0)),
            }],
            attributes: vec![],
        };
        let mut info = vec![];
        code.serialize(&mut info).unwrap();
        assert_eq!(info.len(), 2 + 2 + 4 + 2 + 2 + 8 + 2);

        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info,
        };
        let parsed: Code = attribute.decode().unwrap();
        assert_eq!(parsed.code_array, code.code_array);
        assert_eq!(parsed.exception_table, code.exception_table);
    }

    #[test]
    fn truncated_attribute_is_malformed() {
        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 1, 0],
        };
        assert!(matches!(
            attribute.decode::<LineNumberTable>(),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn compact_frame_tags() {
        let mut bytes = vec![];
        StackMapFrame::SameLocalsNoStack { offset_delta: 5 }
            .serialize(&mut bytes)
            .unwrap();
        StackMapFrame::ChopLocalsNoStack {
            offset_delta: 3,
            chopped_k: 2,
        }
        .serialize(&mut bytes)
        .unwrap();
        StackMapFrame::SameLocalsOneStack {
            offset_delta: 100,
            stack: VerificationType::Integer,
        }
        .serialize(&mut bytes)
        .unwrap();
        assert_eq!(bytes, vec![5, 249, 0, 3, 247, 0, 100, 1]);
    }
}
