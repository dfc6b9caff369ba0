//! Reading and writing the intermediate representation through files.

use dimble_core::{tags, Attribute, Dtype, PixelTensor, VR};
use dimble_json::{from_source, to_source_with_uri, SidecarError, TensorSidecar};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn sidecar_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.safetensors");
    let tensor = PixelTensor::from_vec(vec![2, 2], vec![-1i16, 0, 1, 2]).unwrap();
    let sidecar = TensorSidecar::new(tensor.clone()).with_metadata("origin", "scanner");
    sidecar.write(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    // header length, then the sample bytes at an offset multiple of 8
    let header_len = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
    assert_eq!(header_len % 8, 0);
    assert_eq!(bytes.len(), 8 + header_len + 8);

    let read = TensorSidecar::open(&path).unwrap();
    assert_eq!(read, sidecar);
    assert_eq!(read.tensor.dtype(), Dtype::I16);
    assert_eq!(read.metadata.get("origin").map(String::as_str), Some("scanner"));
}

#[test]
fn missing_sidecar_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = TensorSidecar::open(dir.path().join("absent.safetensors")).unwrap_err();
    assert!(matches!(err, SidecarError::ReadFile { .. }));
}

#[test]
fn metadata_file_with_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let raw = json!({
        "00080060": { "vr": "CS", "Value": ["MR"] },
        "00280010": { "vr": "US", "Value": [2] },
        "7FE00010": { "vr": "OB", "BulkDataURI": "image.safetensors" }
    });
    let json_path = dir.path().join("image.json");
    std::fs::write(&json_path, serde_json::to_vec_pretty(&raw).unwrap()).unwrap();

    let sidecar_path = dir.path().join("image.safetensors");
    let tensor = PixelTensor::from_vec(vec![2, 1], vec![7u8, 9]).unwrap();
    TensorSidecar::new(tensor.clone()).write(&sidecar_path).unwrap();

    let file = std::fs::File::open(&json_path).unwrap();
    let metadata: serde_json::Value = serde_json::from_reader(file).unwrap();
    let pixels = TensorSidecar::open(&sidecar_path).unwrap().tensor;
    let (set, pixels) = from_source(metadata, Some(pixels)).unwrap();

    assert_eq!(pixels, Some(tensor));
    assert_eq!(
        set.get(tags::PIXEL_DATA),
        Some(&Attribute::pixel_placeholder(VR::OB))
    );

    let back = to_source_with_uri(&set, "image.safetensors").unwrap();
    assert_eq!(back, raw);
}
