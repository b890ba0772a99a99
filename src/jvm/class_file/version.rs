use super::Serialize;
use byteorder::WriteBytesExt;
use std::io::Result;

/// Version of the class file, which tells the JVM which features the class may use
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// Java SE 5.0
    ///
    /// Class files below 50.0 are checked by type inference, so they need no `StackMapTable` and
    /// may still use `jsr`/`ret`.
    pub const JAVA5: Version = Version {
        major_version: 49,
        minor_version: 0,
    };

    /// Java SE 8
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// Java SE 11
    pub const JAVA11: Version = Version {
        major_version: 55,
        minor_version: 0,
    };
}

impl Default for Version {
    fn default() -> Version {
        Version::JAVA5
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)
    }
}
