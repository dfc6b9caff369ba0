use dimble::container::{Device, DimbleFile, LoadError};
use dimble::core::{tags, Attribute, Dtype, PixelTensor, VR};
use dimble::json::TensorSidecar;
use dimble::{EncodeOptions, Error, ExportOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};

fn metadata() -> serde_json::Value {
    json!({
        "00080060": { "vr": "CS", "Value": ["CT"] },
        "00089215": {
            "vr": "SQ",
            "Value": [{
                "00080100": { "vr": "SH", "Value": ["113072"] },
                "00080102": { "vr": "SH", "Value": ["DCM"] },
                "00080104": { "vr": "LO", "Value": ["Uniform Resampling"] }
            }]
        },
        "00100010": { "vr": "PN", "Value": [{ "Alphabetic": "Doe^Jane" }] },
        "00100020": { "vr": "LO", "Value": ["P-0001"] },
        "00280010": { "vr": "US", "Value": [3] },
        "00280011": { "vr": "US", "Value": [4] },
        "7FE00010": { "vr": "OW", "BulkDataURI": "image.safetensors" }
    })
}

fn pixels() -> PixelTensor {
    PixelTensor::from_vec(vec![2, 3, 4], (0..24u16).collect::<Vec<_>>()).unwrap()
}

/// Write the intermediate representation to `dir`,
/// returning the paths of the JSON and sidecar files.
fn write_source(dir: &Path) -> (PathBuf, PathBuf) {
    let json_path = dir.join("image.json");
    std::fs::write(&json_path, serde_json::to_vec(&metadata()).unwrap()).unwrap();
    let sidecar_path = dir.join("image.safetensors");
    TensorSidecar::new(pixels())
        .with_metadata("source", "test")
        .write(&sidecar_path)
        .unwrap();
    (json_path, sidecar_path)
}

#[test]
fn convert_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");

    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let bytes = dimble::encode_dicom_like(&json_path, Some(sidecar_path.as_path())).unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), bytes);

    let loaded = dimble::load(&out, &["00100020", "(7FE0,0010)"], "cpu", Some("1:2,:,0:2")).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(
        loaded
            .attribute(tags::PATIENT_ID)
            .and_then(|a| a.to_str())
            .unwrap(),
        "P-0001"
    );
    let tensor = loaded.tensor().unwrap();
    assert_eq!(tensor.device(), &Device::Cpu);
    assert_eq!(tensor.pixels().shape(), &[1, 3, 2]);
    assert_eq!(
        tensor.pixels().to_vec::<u16>().unwrap(),
        vec![12, 13, 16, 17, 20, 21]
    );
}

#[test]
fn load_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let loaded = dimble::load(&out, &[], "cpu", None).unwrap();
    assert_eq!(loaded.len(), 7);
    assert!(loaded.not_found().is_empty());
    assert_eq!(
        loaded.tensor().unwrap().pixels(),
        &pixels()
    );
}

#[test]
fn convert_with_pixel_dtype() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");
    EncodeOptions::new()
        .pixel_dtype(Dtype::F32)
        .staging_dir(dir.path())
        .convert(&json_path, Some(sidecar_path.as_path()), &out)
        .unwrap();

    let file = DimbleFile::open(&out).unwrap();
    assert_eq!(file.tensor_info().map(|info| info.dtype), Some(Dtype::F32));
    // the word placeholder from the metadata follows the converted samples
    assert_eq!(
        file.read_attribute(tags::PIXEL_DATA).unwrap(),
        Attribute::pixel_placeholder(VR::OF)
    );

    let loaded = dimble::load_as(&out, &["7FE00010"], "cpu", Some("0"), "uint8").unwrap();
    let tensor = loaded.tensor().unwrap();
    assert_eq!(tensor.pixels().dtype(), Dtype::U8);
    assert_eq!(tensor.pixels().shape(), &[1, 3, 4]);
}

#[test]
fn export_restores_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let raw = dimble::export(&out).unwrap();
    let mut expected = metadata();
    expected["7FE00010"] = json!({
        "vr": "OW",
        "BulkDataURI": "dimble:pixel_array?dtype=uint16&shape=2,3,4"
    });
    assert_eq!(raw, expected);
}

#[test]
fn export_files_with_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("scan.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let export_dir = tempfile::tempdir().unwrap();
    let options = ExportOptions::new()
        .output_dir(export_dir.path())
        .pixels(true);
    let exported = dimble::export_to_metadata_json(&out, &options).unwrap();
    assert_eq!(exported, export_dir.path().join("scan.json"));

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&exported).unwrap()).unwrap();
    assert_eq!(
        raw["7FE00010"],
        json!({ "vr": "OW", "BulkDataURI": "scan.safetensors" })
    );

    let sidecar = TensorSidecar::open(export_dir.path().join("scan.safetensors")).unwrap();
    assert_eq!(sidecar.tensor, pixels());

    // the exported pair converts back into the same container
    let again = dimble::encode_dicom_like(
        &exported,
        Some(export_dir.path().join("scan.safetensors").as_path()),
    )
    .unwrap();
    assert_eq!(again, std::fs::read(&out).unwrap());
}

#[test]
fn export_files_without_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("scan.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let exported = dimble::export_to_metadata_json(&out, &ExportOptions::new()).unwrap();
    assert_eq!(exported, dir.path().join("scan.json"));
    assert!(!dir.path().join("scan.safetensors").exists());
}

#[test]
fn export_keeps_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();
    let source_json = std::fs::read(&json_path).unwrap();
    let source_sidecar = std::fs::read(&sidecar_path).unwrap();

    // image.json and image.safetensors are the files the container came from
    let err = dimble::export_to_metadata_json(&out, &ExportOptions::new().pixels(true))
        .unwrap_err();
    assert!(matches!(err, Error::OutputExists { .. }));
    assert_eq!(std::fs::read(&json_path).unwrap(), source_json);
    assert_eq!(std::fs::read(&sidecar_path).unwrap(), source_sidecar);

    let options = ExportOptions::new().pixels(true).overwrite(true);
    let exported = dimble::export_to_metadata_json(&out, &options).unwrap();
    assert_eq!(exported, json_path);
    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&exported).unwrap()).unwrap();
    assert_eq!(raw, metadata());
    assert_eq!(TensorSidecar::open(&sidecar_path).unwrap().tensor, pixels());

    // no staging files are left behind
    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["image.dimble", "image.json", "image.safetensors"]);
}

#[test]
fn bad_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let (json_path, sidecar_path) = write_source(dir.path());
    let out = dir.path().join("image.dimble");
    dimble::convert_to_dimble(&json_path, Some(sidecar_path.as_path()), &out, &EncodeOptions::new())
        .unwrap();

    let err = dimble::load(&out, &["PatientID!"], "cpu", None).unwrap_err();
    assert!(matches!(err, Error::ParseTag { .. }));

    let err = dimble::load(&out, &[], "tpu", None).unwrap_err();
    assert!(matches!(err, Error::ParseDevice { .. }));

    let err = dimble::load(&out, &[], "cpu", Some("a:b")).unwrap_err();
    assert!(matches!(err, Error::ParseSlice { .. }));

    let err = dimble::load_as(&out, &[], "cpu", None, "complex64").unwrap_err();
    assert!(matches!(err, Error::UnsupportedDtype { .. }));
    let err = dimble::load_as(&out, &[], "cpu", None, "uint7").unwrap_err();
    assert!(matches!(err, Error::UnsupportedDtype { .. }));

    let err = dimble::load(&out, &[], "cuda:0", None).unwrap_err();
    assert!(matches!(
        err,
        Error::Load {
            source: LoadError::Placement { .. },
            ..
        }
    ));
}

#[test]
fn missing_metadata_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("image.dimble");
    let err = dimble::convert_to_dimble(
        dir.path().join("absent.json"),
        None,
        &out,
        &EncodeOptions::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ReadMetadata { .. }));
    assert!(!out.exists());
}
