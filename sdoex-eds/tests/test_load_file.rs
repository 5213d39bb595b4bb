use std::io::Write as _;

use sdoex_common::NodeId;
use sdoex_eds::{AccessType, DataType, EdsError, ObjectDictionary};

const EDS: &str = r#"
; Minimal device with a single manufacturer object
[DeviceInfo]
VendorName=Test Vendor
ProductName=File Node

[ManufacturerObjects]
SupportedObjects=1
1=0x4000

[4000]
ParameterName=Counter
DataType=0x0007
AccessType=wo
"#;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EDS.as_bytes()).unwrap();

    let od = ObjectDictionary::load(file.path(), NodeId::new(1).ok()).unwrap();
    assert_eq!(Some("File Node"), od.device_info.product_name.as_deref());

    let sub = od.sub_object(0x4000, 0).unwrap();
    assert_eq!(DataType::UInt32, sub.data_type);
    assert_eq!(AccessType::Wo, sub.access_type);
    assert!(sub.access_type.is_writable());
    assert_eq!(None, sub.default);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does_not_exist.eds");
    let err = ObjectDictionary::load(&path, None).unwrap_err();
    match err {
        EdsError::Io { path: err_path, .. } => assert_eq!(path, err_path),
        other => panic!("Expected Io error, got {other:?}"),
    }
}

#[test]
fn test_garbage_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"this is not a data sheet\n").unwrap();
    assert!(ObjectDictionary::load(file.path(), None).is_err());
}
