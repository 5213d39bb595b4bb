//! Enumerations describing object entries in an EDS file

/// The object code of an object dictionary entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectType {
    /// An object with no data fields
    Null,
    /// A large variable amount of data
    Domain,
    /// A type definition
    DefType,
    /// A record type definition
    DefStruct,
    /// A single value
    Var,
    /// Multiple values of the same type, with sub 0 holding the count
    Array,
    /// Multiple values of differing types, with sub 0 holding the count
    Record,
}

impl ObjectType {
    /// Convert from the raw object code used in EDS files
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0x0 => Some(Self::Null),
            0x2 => Some(Self::Domain),
            0x5 => Some(Self::DefType),
            0x6 => Some(Self::DefStruct),
            0x7 => Some(Self::Var),
            0x8 => Some(Self::Array),
            0x9 => Some(Self::Record),
            _ => None,
        }
    }

    /// Returns true for object types whose data lives in sub-object sections
    pub fn has_sub_objects(&self) -> bool {
        matches!(self, Self::Array | Self::Record | Self::DefStruct)
    }
}

/// Data type of a sub-object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataType {
    /// BOOLEAN
    Boolean,
    /// INTEGER8
    Int8,
    /// INTEGER16
    Int16,
    /// INTEGER32
    Int32,
    /// UNSIGNED8
    UInt8,
    /// UNSIGNED16
    UInt16,
    /// UNSIGNED32
    UInt32,
    /// REAL32
    Real32,
    /// VISIBLE_STRING
    VisibleString,
    /// OCTET_STRING
    OctetString,
    /// UNICODE_STRING
    UnicodeString,
    /// TIME_OF_DAY
    TimeOfDay,
    /// TIME_DIFFERENCE
    TimeDifference,
    /// DOMAIN
    Domain,
    /// REAL64
    Real64,
    /// INTEGER64
    Int64,
    /// UNSIGNED64
    UInt64,
    /// Any other type code, e.g. the 24/40/48/56-bit integers or a custom definition
    Other(u16),
}

impl DataType {
    /// Convert from the raw data type index used in EDS files
    pub fn from_code(code: u16) -> Self {
        match code {
            0x01 => Self::Boolean,
            0x02 => Self::Int8,
            0x03 => Self::Int16,
            0x04 => Self::Int32,
            0x05 => Self::UInt8,
            0x06 => Self::UInt16,
            0x07 => Self::UInt32,
            0x08 => Self::Real32,
            0x09 => Self::VisibleString,
            0x0A => Self::OctetString,
            0x0B => Self::UnicodeString,
            0x0C => Self::TimeOfDay,
            0x0D => Self::TimeDifference,
            0x0F => Self::Domain,
            0x11 => Self::Real64,
            0x15 => Self::Int64,
            0x1B => Self::UInt64,
            other => Self::Other(other),
        }
    }

    /// The fixed encoded size in bytes, or None for variable length types
    pub fn size(&self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Real32 => Some(4),
            Self::TimeOfDay | Self::TimeDifference => Some(6),
            Self::Int64 | Self::UInt64 | Self::Real64 => Some(8),
            Self::VisibleString
            | Self::OctetString
            | Self::UnicodeString
            | Self::Domain
            | Self::Other(_) => None,
        }
    }
}

/// Access permissions of a sub-object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Read only
    Ro,
    /// Write only
    Wo,
    /// Read/write
    Rw,
    /// Read/write, mappable to TPDOs
    Rwr,
    /// Read/write, mappable to RPDOs
    Rww,
    /// Read only, value never changes
    Const,
}

impl AccessType {
    /// Parse an access type string, e.g. "rw", ignoring case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ro" => Some(Self::Ro),
            "wo" => Some(Self::Wo),
            "rw" => Some(Self::Rw),
            "rwr" => Some(Self::Rwr),
            "rww" => Some(Self::Rww),
            "const" => Some(Self::Const),
            _ => None,
        }
    }

    /// Returns true if an SDO client is allowed to write the sub-object
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Wo | Self::Rw | Self::Rwr | Self::Rww)
    }
}

/// Parse an integer as it appears in an EDS file
///
/// Accepts decimal, or hex with a `0x` prefix. Octal (leading 0) is also allowed by the standard.
pub fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()
    } else if value.len() > 1 && value.starts_with('0') {
        u64::from_str_radix(&value[1..], 8).ok()
    } else {
        value.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        assert_eq!(Some(0x4000), parse_int("0x4000"));
        assert_eq!(Some(0x4000), parse_int(" 0X4000 "));
        assert_eq!(Some(16), parse_int("16"));
        assert_eq!(Some(0), parse_int("0"));
        assert_eq!(Some(8), parse_int("010"));
        assert_eq!(None, parse_int("0xZZ"));
        assert_eq!(None, parse_int(""));
    }

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(Some(4), DataType::from_code(0x7).size());
        assert_eq!(Some(1), DataType::from_code(0x5).size());
        assert_eq!(None, DataType::from_code(0x9).size());
        assert_eq!(DataType::Other(0x16), DataType::from_code(0x16));
    }

    #[test]
    fn test_access_type() {
        assert_eq!(Some(AccessType::Rw), AccessType::parse("RW"));
        assert!(AccessType::parse("rww").unwrap().is_writable());
        assert!(!AccessType::parse("const").unwrap().is_writable());
        assert!(!AccessType::parse("ro").unwrap().is_writable());
        assert_eq!(None, AccessType::parse("rx"));
    }
}
