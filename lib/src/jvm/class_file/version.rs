use crate::jvm::class_file::{Parse, Serialize};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
///
/// Ordering compares the major version first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    const fn major(major_version: u16) -> Version {
        Version {
            major_version,
            minor_version: 0,
        }
    }

    pub const JAVA1_1: Version = Version {
        major_version: 45,
        minor_version: 3,
    };
    pub const JAVA5: Version = Version::major(49);
    pub const JAVA6: Version = Version::major(50);
    pub const JAVA7: Version = Version::major(51);
    pub const JAVA8: Version = Version::major(52);
    pub const JAVA11: Version = Version::major(55);
    pub const JAVA17: Version = Version::major(61);

    /// Class files from Java 6 onwards carry `StackMapTable` attributes
    pub fn supports_stack_map_table(&self) -> bool {
        self.major_version >= 50
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Version {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let minor_version = u16::parse(reader)?;
        let major_version = u16::parse(reader)?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}
