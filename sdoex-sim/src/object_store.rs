//! Object storage for a simulated node
//!
//! Each sub-object holds its current value as raw little-endian bytes, along with the data type and
//! access type from the EDS when it was built from one. Objects may also be given names with
//! [`ObjectStore::register`], and then read and written as typed integers by name.
use std::collections::{BTreeMap, HashMap};

use sdoex_common::sdo::AbortCode;
use sdoex_eds::{AccessType, DataType, ObjectDictionary, SubObject};
use snafu::{ensure, OptionExt, Snafu};

/// Error returned when accessing objects locally
#[derive(Clone, Debug, PartialEq, Snafu)]
pub enum ObjectError {
    /// There is no sub-object at the address
    #[snafu(display("No object at 0x{index:04X}sub{sub}"))]
    NoSuchObject {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
    },
    /// No object has been registered with the name
    #[snafu(display("No object is registered as '{name}'"))]
    UnknownName {
        /// The name looked up
        name: String,
    },
    /// The data type cannot be accessed as an integer
    #[snafu(display("{data_type:?} is not an integer type"))]
    NotInteger {
        /// The data type of the object
        data_type: DataType,
    },
    /// A value of the wrong type was written to a named object
    #[snafu(display("Cannot store a {value:?} in a {data_type:?} object"))]
    TypeMismatch {
        /// The data type of the object
        data_type: DataType,
        /// The rejected value
        value: ObjectValue,
    },
    /// The stored data is too short for the registered type
    #[snafu(display("Object 0x{index:04X}sub{sub} holds {len} bytes"))]
    BadLength {
        /// Object index
        index: u16,
        /// Sub index
        sub: u8,
        /// Number of bytes stored
        len: usize,
    },
}

/// An integer value of one of the standard integer data types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ObjectValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
}

macro_rules! value_conversions {
    ($($variant:ident: $ty:ty => $data_type:ident),*) => {
        $(
            impl From<$ty> for ObjectValue {
                fn from(value: $ty) -> Self {
                    ObjectValue::$variant(value)
                }
            }
        )*

        impl ObjectValue {
            /// The data type this value is stored as
            pub fn data_type(&self) -> DataType {
                match self {
                    $(ObjectValue::$variant(_) => DataType::$data_type,)*
                }
            }

            /// Encode as little-endian bytes
            pub fn to_bytes(&self) -> Vec<u8> {
                match self {
                    $(ObjectValue::$variant(v) => v.to_le_bytes().to_vec(),)*
                }
            }

            /// Decode little-endian bytes as `data_type`
            ///
            /// Returns None if the type is not an integer type, or the length is wrong
            pub fn decode(data_type: DataType, bytes: &[u8]) -> Option<Self> {
                match data_type {
                    $(DataType::$data_type => Some(ObjectValue::$variant(<$ty>::from_le_bytes(
                        bytes.try_into().ok()?,
                    ))),)*
                    _ => None,
                }
            }
        }
    };
}

value_conversions!(
    I8: i8 => Int8,
    I16: i16 => Int16,
    I32: i32 => Int32,
    I64: i64 => Int64,
    U8: u8 => UInt8,
    U16: u16 => UInt16,
    U32: u32 => UInt32,
    U64: u64 => UInt64
);

impl ObjectValue {
    /// The value as a u64, if it is unsigned
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            ObjectValue::U8(v) => Some(v as u64),
            ObjectValue::U16(v) => Some(v as u64),
            ObjectValue::U32(v) => Some(v as u64),
            ObjectValue::U64(v) => Some(v),
            _ => None,
        }
    }

    /// The value as an i64, if it is signed
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ObjectValue::I8(v) => Some(v as i64),
            ObjectValue::I16(v) => Some(v as i64),
            ObjectValue::I32(v) => Some(v as i64),
            ObjectValue::I64(v) => Some(v),
            _ => None,
        }
    }
}

fn is_integer(data_type: DataType) -> bool {
    matches!(
        data_type,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// A stored sub-object
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEntry {
    /// The current value
    pub data: Vec<u8>,
    /// The declared data type, if known
    pub data_type: Option<DataType>,
    /// Access permissions for SDO clients
    pub access_type: AccessType,
}

impl ObjectEntry {
    /// An entry with no declared type, which SDO clients may read and write freely
    pub fn untyped(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            data_type: None,
            access_type: AccessType::Rw,
        }
    }

    /// An entry holding an integer value, with its type taken from the value
    pub fn typed(value: ObjectValue, access_type: AccessType) -> Self {
        Self {
            data: value.to_bytes(),
            data_type: Some(value.data_type()),
            access_type,
        }
    }

    fn from_sub_object(sub: &SubObject) -> Self {
        let data = match (sub.data_type.size(), sub.default) {
            (Some(size), Some(default)) if size <= 8 => default.to_le_bytes()[..size].to_vec(),
            (Some(size), _) => vec![0; size],
            (None, _) => match sub.data_type {
                DataType::VisibleString | DataType::OctetString => sub
                    .default_value
                    .as_deref()
                    .unwrap_or_default()
                    .as_bytes()
                    .to_vec(),
                _ => Vec::new(),
            },
        };
        Self {
            data,
            data_type: Some(sub.data_type),
            access_type: sub.access_type,
        }
    }
}

/// The object dictionary of a simulated node
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectStore {
    entries: BTreeMap<(u16, u8), ObjectEntry>,
    names: HashMap<String, (u16, u8)>,
}

impl ObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding every sub-object in `od`, set to its default value
    ///
    /// Integer defaults come from the EDS with `$NODEID` already substituted. String defaults are
    /// stored as their raw text, and sub-objects with no usable default are zero filled.
    pub fn from_dictionary(od: &ObjectDictionary) -> Self {
        let mut store = Self::new();
        for object in od.objects() {
            for (sub, sub_object) in &object.subs {
                store.insert(
                    object.index,
                    *sub,
                    ObjectEntry::from_sub_object(sub_object),
                );
            }
        }
        log::debug!("Created object store with {} sub-objects", store.len());
        store
    }

    /// Add or replace a sub-object
    pub fn insert(&mut self, index: u16, sub: u8, entry: ObjectEntry) {
        self.entries.insert((index, sub), entry);
    }

    /// Number of sub-objects stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no sub-objects are stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a sub-object
    pub fn entry(&self, index: u16, sub: u8) -> Option<&ObjectEntry> {
        self.entries.get(&(index, sub))
    }

    /// Get the current value of a sub-object
    pub fn get(&self, index: u16, sub: u8) -> Option<&[u8]> {
        self.entry(index, sub).map(|e| e.data.as_slice())
    }

    /// Replace the value of an existing sub-object
    ///
    /// Access permissions are not checked, since they only apply to SDO clients.
    pub fn set(&mut self, index: u16, sub: u8, data: impl Into<Vec<u8>>) -> Result<(), ObjectError> {
        let entry = self
            .entries
            .get_mut(&(index, sub))
            .context(NoSuchObjectSnafu { index, sub })?;
        entry.data = data.into();
        Ok(())
    }

    /// Restore every sub-object in `indices` to its value in `defaults`
    pub fn restore(&mut self, defaults: &ObjectStore, indices: impl core::ops::RangeBounds<u16>) {
        self.entries.retain(|(index, _), _| !indices.contains(index));
        for (&(index, sub), entry) in &defaults.entries {
            if indices.contains(&index) {
                self.entries.insert((index, sub), entry.clone());
            }
        }
    }

    /// Give an integer sub-object a name, for access with [`read_named`](Self::read_named) and
    /// [`write_named`](Self::write_named)
    ///
    /// `data_type` is how the value is interpreted, and overrides any type declared in the EDS.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        index: u16,
        sub: u8,
        data_type: DataType,
    ) -> Result<(), ObjectError> {
        ensure!(is_integer(data_type), NotIntegerSnafu { data_type });
        let entry = self
            .entries
            .get_mut(&(index, sub))
            .context(NoSuchObjectSnafu { index, sub })?;
        entry.data_type = Some(data_type);
        entry.data.resize(data_type.size().unwrap_or_default(), 0);
        self.names.insert(name.into(), (index, sub));
        Ok(())
    }

    /// Read a registered object
    pub fn read_named(&self, name: &str) -> Result<ObjectValue, ObjectError> {
        let (index, sub, entry) = self.named(name)?;
        let data_type = entry.data_type.unwrap_or(DataType::Domain);
        ObjectValue::decode(data_type, &entry.data).context(BadLengthSnafu {
            index,
            sub,
            len: entry.data.len(),
        })
    }

    /// Write a registered object
    ///
    /// The value must be of the type the object was registered with.
    pub fn write_named(
        &mut self,
        name: &str,
        value: impl Into<ObjectValue>,
    ) -> Result<(), ObjectError> {
        let value = value.into();
        let (index, sub, entry) = self.named(name)?;
        let data_type = entry.data_type.unwrap_or(DataType::Domain);
        ensure!(
            value.data_type() == data_type,
            TypeMismatchSnafu { data_type, value }
        );
        self.set(index, sub, value.to_bytes())
    }

    fn named(&self, name: &str) -> Result<(u16, u8, &ObjectEntry), ObjectError> {
        let &(index, sub) = self.names.get(name).context(UnknownNameSnafu { name })?;
        let entry = self.entry(index, sub).context(NoSuchObjectSnafu { index, sub })?;
        Ok((index, sub, entry))
    }

    /// Check whether an SDO client may write `len` bytes to a sub-object
    pub fn check_write(&self, index: u16, sub: u8, len: usize) -> Result<(), AbortCode> {
        let entry = self.check_writable(index, sub)?;
        match entry.data_type.and_then(|t| t.size()) {
            Some(size) if len > size => Err(AbortCode::DataTypeMismatchLengthHigh),
            Some(size) if len < size => Err(AbortCode::DataTypeMismatchLengthLow),
            _ => Ok(()),
        }
    }

    /// Check whether an SDO client may write a sub-object, before its length is known
    pub fn check_writable(&self, index: u16, sub: u8) -> Result<&ObjectEntry, AbortCode> {
        let entry = self.check_exists(index, sub)?;
        if !entry.access_type.is_writable() {
            return Err(AbortCode::ReadOnly);
        }
        Ok(entry)
    }

    /// Check whether an SDO client may read a sub-object, and get its value
    pub fn check_read(&self, index: u16, sub: u8) -> Result<&[u8], AbortCode> {
        let entry = self.check_exists(index, sub)?;
        if entry.access_type == AccessType::Wo {
            return Err(AbortCode::WriteOnly);
        }
        Ok(&entry.data)
    }

    fn check_exists(&self, index: u16, sub: u8) -> Result<&ObjectEntry, AbortCode> {
        match self.entries.get(&(index, sub)) {
            Some(entry) => Ok(entry),
            None if self.entries.keys().any(|(i, _)| *i == index) => {
                Err(AbortCode::NoSuchSubIndex)
            }
            None => Err(AbortCode::NoSuchObject),
        }
    }
}
