use crate::jvm::Error;
use byteorder::{BigEndian, ReadBytesExt};

/// Types that can be read out of the class file format
pub trait Parse: Sized {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error>;
}

impl Parse for u8 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

impl Parse for u16 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u16::<BigEndian>()?)
    }
}

impl Parse for u32 {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(reader.read_u32::<BigEndian>()?)
    }
}

/// Lists in class files are prefixed with a `u16` count
impl<A: Parse> Parse for Vec<A> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)?;
        let mut elems = Vec::with_capacity(count as usize);
        for _ in 0..count {
            elems.push(A::parse(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` bytes
pub fn parse_bytes<R: ReadBytesExt>(reader: &mut R, len: usize) -> Result<Vec<u8>, Error> {
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Running out of input in the middle of a structure means the structure is malformed
pub(crate) fn truncation_is_malformed(err: Error) -> Error {
    match err {
        Error::IoError(io_err) if io_err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Error::Malformed(String::from("unexpected end of input"))
        }
        other => other,
    }
}
