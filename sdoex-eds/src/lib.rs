//! Loading of CANopen electronic data sheet (EDS) files
//!
//! An EDS is an INI style document describing the object dictionary of a device. Each object has
//! a section named by its hex index (e.g. `[1018]`), and objects with multiple sub-objects have
//! additional sections for each (e.g. `[1018sub1]`). The `[DeviceInfo]` section identifies the
//! device, and the `[MandatoryObjects]`, `[OptionalObjects]` and `[ManufacturerObjects]` sections
//! list which indices are present.
//!
//! ```ignore
//! let od = ObjectDictionary::load("device.eds", NodeId::new(5).ok())?;
//! if let Some(sub) = od.sub_object(0x4000, 0) {
//!     println!("{} is {:?}", sub.name, sub.data_type);
//! }
//! ```
#![warn(missing_docs, missing_copy_implementations)]

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use configparser::ini::Ini;
use sdoex_common::NodeId;
use snafu::{OptionExt, ResultExt, Snafu};

mod types;
pub use types::{parse_int, AccessType, DataType, ObjectType};

/// Error returned when loading an EDS
#[derive(Debug, Snafu)]
pub enum EdsError {
    /// The file could not be read
    #[snafu(display("Failed to read {}", path.display()))]
    Io {
        /// The path which was being read
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },
    /// The text is not a valid INI document
    #[snafu(display("Malformed EDS: {message}"))]
    Syntax {
        /// Description from the INI parser
        message: String,
    },
    /// A required section is absent
    #[snafu(display("Missing section [{section}]"))]
    MissingSection {
        /// Name of the section
        section: String,
    },
    /// A required key is absent from a section
    #[snafu(display("Missing key {key} in section [{section}]"))]
    MissingKey {
        /// Name of the section
        section: String,
        /// Name of the key
        key: String,
    },
    /// A key has a value which could not be interpreted
    #[snafu(display("Invalid value '{value}' for {key} in section [{section}]"))]
    InvalidValue {
        /// Name of the section
        section: String,
        /// Name of the key
        key: String,
        /// The raw value
        value: String,
    },
    /// An object list refers to an index with no section
    #[snafu(display("Object 0x{index:04X} is listed in [{list}] but has no section"))]
    MissingObject {
        /// Name of the list section
        list: String,
        /// The listed object index
        index: u16,
    },
}

type Result<T> = std::result::Result<T, EdsError>;

/// Section names are lower case, as configparser normalizes them
const DEVICE_INFO: &str = "deviceinfo";
const OBJECT_LISTS: [&str; 3] = ["mandatoryobjects", "optionalobjects", "manufacturerobjects"];

/// Identification of the device described by an EDS
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceInfo {
    /// Manufacturer name
    pub vendor_name: Option<String>,
    /// CiA assigned vendor ID
    pub vendor_number: Option<u32>,
    /// Product name
    pub product_name: Option<String>,
    /// Manufacturer specific product code
    pub product_number: Option<u32>,
    /// Revision number
    pub revision_number: Option<u32>,
}

/// A single value within an object
#[derive(Clone, Debug, PartialEq)]
pub struct SubObject {
    /// Parameter name
    pub name: String,
    /// The type of data stored
    pub data_type: DataType,
    /// Access permissions
    pub access_type: AccessType,
    /// The default value exactly as written in the EDS
    pub default_value: Option<String>,
    /// The default value as an integer, with `$NODEID` substituted, if it is numeric
    pub default: Option<u64>,
    /// Whether the sub-object may be mapped into a PDO
    pub pdo_mapping: bool,
}

/// An object dictionary entry
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    /// Object index
    pub index: u16,
    /// Parameter name
    pub name: String,
    /// Object code
    pub object_type: ObjectType,
    /// Sub-objects, by sub index. A VAR object has exactly one, at sub index 0.
    pub subs: BTreeMap<u8, SubObject>,
}

/// The object dictionary described by an EDS file
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDictionary {
    /// Device identification
    pub device_info: DeviceInfo,
    objects: BTreeMap<u16, Object>,
}

type Sections = HashMap<String, HashMap<String, Option<String>>>;

fn get<'a>(sections: &'a Sections, section: &str, key: &str) -> Option<&'a str> {
    sections
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_deref())
        .map(str::trim)
}

fn require<'a>(sections: &'a Sections, section: &str, key: &str) -> Result<&'a str> {
    get(sections, section, key).context(MissingKeySnafu { section, key })
}

fn get_int(sections: &Sections, section: &str, key: &str) -> Result<Option<u64>> {
    match get(sections, section, key) {
        None | Some("") => Ok(None),
        Some(value) => parse_int(value)
            .map(Some)
            .context(InvalidValueSnafu {
                section,
                key,
                value,
            }),
    }
}

fn require_int(sections: &Sections, section: &str, key: &str) -> Result<u64> {
    let value = require(sections, section, key)?;
    parse_int(value).context(InvalidValueSnafu {
        section,
        key,
        value,
    })
}

fn get_u32(sections: &Sections, section: &str, key: &str) -> Result<Option<u32>> {
    match get_int(sections, section, key)? {
        None => Ok(None),
        Some(v) => u32::try_from(v).ok().map(Some).context(InvalidValueSnafu {
            section,
            key,
            value: v.to_string(),
        }),
    }
}

/// Parse a section name into an (index, sub) pair
///
/// `[2000]` gives `(0x2000, None)`, and `[2000sub1a]` gives `(0x2000, Some(0x1a))`. Other section
/// names give None.
fn parse_section_name(name: &str) -> Option<(u16, Option<u8>)> {
    let is_hex = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    match name.split_once("sub") {
        Some((index, sub)) if index.len() == 4 && is_hex(index) && is_hex(sub) => Some((
            u16::from_str_radix(index, 16).ok()?,
            Some(u8::from_str_radix(sub, 16).ok()?),
        )),
        None if name.len() == 4 && is_hex(name) => {
            Some((u16::from_str_radix(name, 16).ok()?, None))
        }
        _ => None,
    }
}

/// Evaluate a default value, substituting the node ID for `$NODEID`
///
/// Expressions such as `$NODEID+0x180` are supported. If the value refers to the node ID and none
/// is provided, or the sum does not fit in a u64, None is returned.
fn resolve_default(raw: &str, node_id: Option<NodeId>) -> Option<u64> {
    let upper = raw.to_ascii_uppercase();
    if upper.contains("$NODEID") {
        let node_id = node_id?.raw() as u64;
        upper.split('+').try_fold(0u64, |acc, term| {
            let term = match term.trim() {
                "$NODEID" => node_id,
                other => parse_int(other)?,
            };
            acc.checked_add(term)
        })
    } else {
        parse_int(raw)
    }
}

fn parse_sub_object(
    sections: &Sections,
    section: &str,
    node_id: Option<NodeId>,
) -> Result<SubObject> {
    let name = require(sections, section, "parametername")?.to_string();
    let data_type_code = require_int(sections, section, "datatype")?;
    let data_type = u16::try_from(data_type_code)
        .ok()
        .map(DataType::from_code)
        .context(InvalidValueSnafu {
            section,
            key: "datatype",
            value: data_type_code.to_string(),
        })?;
    let access = require(sections, section, "accesstype")?;
    let access_type = AccessType::parse(access).context(InvalidValueSnafu {
        section,
        key: "accesstype",
        value: access,
    })?;
    let default_value = get(sections, section, "defaultvalue")
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let default = default_value
        .as_deref()
        .and_then(|v| resolve_default(v, node_id));
    let pdo_mapping = get_int(sections, section, "pdomapping")?.unwrap_or(0) != 0;

    Ok(SubObject {
        name,
        data_type,
        access_type,
        default_value,
        default,
        pdo_mapping,
    })
}

fn parse_object(
    sections: &Sections,
    section: &str,
    index: u16,
    node_id: Option<NodeId>,
) -> Result<Object> {
    let name = require(sections, section, "parametername")?.to_string();
    let object_type = match get_int(sections, section, "objecttype")? {
        // VAR is assumed when the object type is omitted
        None => ObjectType::Var,
        Some(code) => ObjectType::from_code(code).context(InvalidValueSnafu {
            section,
            key: "objecttype",
            value: code.to_string(),
        })?,
    };

    let mut subs = BTreeMap::new();
    if object_type.has_sub_objects() {
        let expected = get_int(sections, section, "subnumber")?;
        for (name, _) in sections.iter() {
            if let Some((i, Some(sub))) = parse_section_name(name) {
                if i == index {
                    subs.insert(sub, parse_sub_object(sections, name, node_id)?);
                }
            }
        }
        if let Some(expected) = expected {
            if expected != subs.len() as u64 {
                log::warn!(
                    "Object 0x{index:04X} declares {expected} sub-objects but {} are defined",
                    subs.len()
                );
            }
        }
    } else if matches!(object_type, ObjectType::Var | ObjectType::Domain) {
        subs.insert(0, parse_sub_object(sections, section, node_id)?);
    }

    Ok(Object {
        index,
        name,
        object_type,
        subs,
    })
}

impl ObjectDictionary {
    /// Load an EDS from a file
    ///
    /// # Arguments
    /// * `path` - Path to the EDS file
    /// * `node_id` - The node ID used to evaluate `$NODEID` expressions in default values
    pub fn load(path: impl AsRef<Path>, node_id: Option<NodeId>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(IoSnafu { path })?;
        Self::load_from_str(&text, node_id)
    }

    /// Load an EDS from a string
    pub fn load_from_str(text: &str, node_id: Option<NodeId>) -> Result<Self> {
        let mut ini = Ini::new();
        let sections = ini
            .read(text.to_string())
            .map_err(|message| SyntaxSnafu { message }.build())?;

        if !sections.contains_key(DEVICE_INFO) {
            return MissingSectionSnafu {
                section: "DeviceInfo",
            }
            .fail();
        }

        let device_info = DeviceInfo {
            vendor_name: get(&sections, DEVICE_INFO, "vendorname").map(str::to_string),
            vendor_number: get_u32(&sections, DEVICE_INFO, "vendornumber")?,
            product_name: get(&sections, DEVICE_INFO, "productname").map(str::to_string),
            product_number: get_u32(&sections, DEVICE_INFO, "productnumber")?,
            revision_number: get_u32(&sections, DEVICE_INFO, "revisionnumber")?,
        };

        let mut objects = BTreeMap::new();
        for name in sections.keys() {
            if let Some((index, None)) = parse_section_name(name) {
                objects.insert(index, parse_object(&sections, name, index, node_id)?);
            }
        }

        for list in OBJECT_LISTS {
            if !sections.contains_key(list) {
                continue;
            }
            let count = require_int(&sections, list, "supportedobjects")?;
            for n in 1..=count {
                let key = n.to_string();
                let index = require_int(&sections, list, &key)?;
                let index = u16::try_from(index).ok().context(InvalidValueSnafu {
                    section: list,
                    key: key.as_str(),
                    value: index.to_string(),
                })?;
                if !objects.contains_key(&index) {
                    return MissingObjectSnafu { list, index }.fail();
                }
            }
        }

        log::debug!(
            "Loaded EDS for {} with {} objects",
            device_info.product_name.as_deref().unwrap_or("unnamed device"),
            objects.len()
        );

        Ok(Self {
            device_info,
            objects,
        })
    }

    /// Get an object by index
    pub fn object(&self, index: u16) -> Option<&Object> {
        self.objects.get(&index)
    }

    /// Get a sub-object by index and sub index
    pub fn sub_object(&self, index: u16, sub: u8) -> Option<&SubObject> {
        self.objects.get(&index).and_then(|obj| obj.subs.get(&sub))
    }

    /// Iterate over all objects in index order
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDS: &str = r#"
[FileInfo]
FileName=test.eds
FileVersion=1

[DeviceInfo]
VendorName=Acme
VendorNumber=0x1234
ProductName=Counter Node
ProductNumber=42
RevisionNumber=0x00010002

[MandatoryObjects]
SupportedObjects=2
1=0x1000
2=0x1018

[OptionalObjects]
SupportedObjects=1
1=0x1800

[ManufacturerObjects]
SupportedObjects=1
1=0x4000

[1000]
ParameterName=Device type
ObjectType=0x7
DataType=0x0007
AccessType=ro
DefaultValue=0x00000191
PDOMapping=0

[1018]
ParameterName=Identity object
ObjectType=0x9
SubNumber=2

[1018sub0]
ParameterName=Highest sub-index supported
DataType=0x0005
AccessType=const
DefaultValue=1

[1018sub1]
ParameterName=Vendor-ID
DataType=0x0007
AccessType=ro
DefaultValue=0x1234

[1800]
ParameterName=TPDO communication parameter
ObjectType=0x9
SubNumber=2

[1800sub0]
ParameterName=Highest sub-index supported
DataType=0x0005
AccessType=const
DefaultValue=2

[1800sub1]
ParameterName=COB-ID used by TPDO
DataType=0x0007
AccessType=rw
DefaultValue=$NODEID+0x180

[4000]
ParameterName=Counter
ObjectType=0x7
DataType=0x0007
AccessType=rw
DefaultValue=0
PDOMapping=1
"#;

    #[test]
    fn test_parse_section_names() {
        assert_eq!(Some((0x1018, None)), parse_section_name("1018"));
        assert_eq!(Some((0x1018, Some(1))), parse_section_name("1018sub1"));
        assert_eq!(Some((0x2000, Some(0x1a))), parse_section_name("2000sub1a"));
        assert_eq!(None, parse_section_name("deviceinfo"));
        assert_eq!(None, parse_section_name("1018name"));
        assert_eq!(None, parse_section_name("1018sub"));
    }

    #[test]
    fn test_resolve_default() {
        let node_id = NodeId::new(5).ok();
        assert_eq!(Some(0x185), resolve_default("$NODEID+0x180", node_id));
        assert_eq!(Some(0x185), resolve_default("0x180 + $nodeid", node_id));
        assert_eq!(None, resolve_default("$NODEID+0x180", None));
        assert_eq!(Some(12), resolve_default("12", None));
        assert_eq!(None, resolve_default("hello", None));
        assert_eq!(None, resolve_default("$NODEID+0xFFFFFFFFFFFFFFFF", node_id));
    }

    #[test]
    fn test_overflowing_default_loads() {
        let eds = "[DeviceInfo]\nProductName=x\n\
                   [4000]\nParameterName=Counter\nDataType=0x7\nAccessType=rw\n\
                   DefaultValue=$NODEID+0xFFFFFFFFFFFFFFFF\n";
        let od = ObjectDictionary::load_from_str(eds, NodeId::new(5).ok()).unwrap();
        let counter = od.sub_object(0x4000, 0).unwrap();
        assert_eq!(None, counter.default);
        assert_eq!(
            Some("$NODEID+0xFFFFFFFFFFFFFFFF"),
            counter.default_value.as_deref()
        );
    }

    #[test]
    fn test_load_device_info() {
        let od = ObjectDictionary::load_from_str(EDS, None).unwrap();
        assert_eq!(
            DeviceInfo {
                vendor_name: Some("Acme".into()),
                vendor_number: Some(0x1234),
                product_name: Some("Counter Node".into()),
                product_number: Some(42),
                revision_number: Some(0x10002),
            },
            od.device_info
        );
        assert_eq!(4, od.objects().count());
    }

    #[test]
    fn test_load_objects() {
        let od = ObjectDictionary::load_from_str(EDS, NodeId::new(3).ok()).unwrap();

        let counter = od.sub_object(0x4000, 0).unwrap();
        assert_eq!("Counter", counter.name);
        assert_eq!(DataType::UInt32, counter.data_type);
        assert_eq!(AccessType::Rw, counter.access_type);
        assert_eq!(Some(0), counter.default);
        assert!(counter.pdo_mapping);

        let identity = od.object(0x1018).unwrap();
        assert_eq!(ObjectType::Record, identity.object_type);
        assert_eq!(2, identity.subs.len());
        assert_eq!(Some(0x1234), identity.subs[&1].default);

        let cob = od.sub_object(0x1800, 1).unwrap();
        assert_eq!(Some("$NODEID+0x180"), cob.default_value.as_deref());
        assert_eq!(Some(0x183), cob.default);

        assert!(od.sub_object(0x4000, 1).is_none());
        assert!(od.sub_object(0x4001, 0).is_none());
    }

    #[test]
    fn test_missing_device_info() {
        let err = ObjectDictionary::load_from_str("[1000]\nParameterName=x\n", None).unwrap_err();
        assert!(matches!(err, EdsError::MissingSection { .. }));
    }

    #[test]
    fn test_listed_object_without_section() {
        let eds = "[DeviceInfo]\nProductName=x\n[MandatoryObjects]\nSupportedObjects=1\n1=0x1000\n";
        let err = ObjectDictionary::load_from_str(eds, None).unwrap_err();
        assert!(matches!(
            err,
            EdsError::MissingObject { index: 0x1000, .. }
        ));
    }

    #[test]
    fn test_bad_access_type() {
        let eds = "[DeviceInfo]\nProductName=x\n\
                   [2000]\nParameterName=x\nDataType=0x7\nAccessType=sometimes\n";
        let err = ObjectDictionary::load_from_str(eds, None).unwrap_err();
        assert!(matches!(err, EdsError::InvalidValue { ref key, .. } if key == "accesstype"));
    }

    #[test]
    fn test_missing_data_type() {
        let eds = "[DeviceInfo]\nProductName=x\n[2000]\nParameterName=x\nAccessType=rw\n";
        let err = ObjectDictionary::load_from_str(eds, None).unwrap_err();
        assert!(matches!(err, EdsError::MissingKey { ref key, .. } if key == "datatype"));
    }
}
