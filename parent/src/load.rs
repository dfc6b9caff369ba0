use crate::error::{
    LoadSnafu, ParseDeviceSnafu, ParseSliceSnafu, ParseTagSnafu, Result, UnsupportedDtypeSnafu,
};
use dimble_container::{Device, LoadOptions, LoadedFields, SliceSpec};
use dimble_core::{Dtype, Tag};
use snafu::ResultExt;
use std::path::Path;

/// Load fields from a container, with every parameter in textual form.
///
/// - `fields` are tags such as `"00100020"` or `"(7FE0,0010)"`;
///   no fields means every field.
/// - `device` is a device name such as `"cpu"` or `"cuda:0"`.
/// - `slices` is a region of the pixel tensor such as `"0:2,:,1:"`.
pub fn load<P>(path: P, fields: &[&str], device: &str, slices: Option<&str>) -> Result<LoadedFields>
where
    P: AsRef<Path>,
{
    load_options(fields, device, slices)?
        .open(path)
        .context(LoadSnafu)
}

/// Load fields from a container like [`load`],
/// converting the pixel tensor to the dtype named by `dtype`.
pub fn load_as<P>(
    path: P,
    fields: &[&str],
    device: &str,
    slices: Option<&str>,
    dtype: &str,
) -> Result<LoadedFields>
where
    P: AsRef<Path>,
{
    let dtype: Dtype = dtype.parse().context(UnsupportedDtypeSnafu)?;
    load_options(fields, device, slices)?
        .dtype(dtype)
        .open(path)
        .context(LoadSnafu)
}

fn load_options(fields: &[&str], device: &str, slices: Option<&str>) -> Result<LoadOptions> {
    let tags = fields
        .iter()
        .map(|text| text.parse::<Tag>().context(ParseTagSnafu { text: *text }))
        .collect::<Result<Vec<_>>>()?;
    let device: Device = device.parse().context(ParseDeviceSnafu)?;
    let slice: SliceSpec = match slices {
        Some(text) => text.parse().context(ParseSliceSnafu)?,
        None => SliceSpec::full(),
    };
    Ok(LoadOptions::new()
        .fields(tags)
        .device(device)
        .slice(slice))
}
