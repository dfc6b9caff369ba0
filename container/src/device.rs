//! Target devices of a loaded tensor and the placement hook.
//!
//! Decoding always happens on the host.
//! A [`Placement`] then moves the decoded samples to the requested device.
//! The default [`HostPlacement`] only knows the host memory,
//! other placements can be plugged in through
//! [`LoadOptions::placement`](crate::LoadOptions::placement).

use dimble_core::{Dtype, PixelTensor};
use snafu::{Backtrace, Snafu};
use std::fmt;
use std::str::FromStr;

/// A device which may hold a tensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// A CUDA device by ordinal
    Cuda(usize),
    /// Apple Metal Performance Shaders
    Mps,
}

impl Device {
    pub fn is_cpu(&self) -> bool {
        *self == Device::Cpu
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Device::Mps => f.write_str("mps"),
        }
    }
}

/// Could not parse a device name.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("Unknown device `{}`", name))]
pub struct ParseDeviceError {
    name: String,
}

/// Parse a device name such as `cpu`, `cuda`, `cuda:1` or `mps`.
impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None => match lower.as_str() {
                "cpu" => Ok(Device::Cpu),
                "cuda" => Ok(Device::Cuda(0)),
                "mps" => Ok(Device::Mps),
                _ => ParseDeviceSnafu { name }.fail(),
            },
            Some(("cuda", ordinal)) => ordinal
                .parse()
                .map(Device::Cuda)
                .map_err(|_| ParseDeviceError {
                    name: name.to_string(),
                }),
            Some(_) => ParseDeviceSnafu { name }.fail(),
        }
    }
}

/// A placement failure.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub))]
pub enum PlacementError {
    /// The placement cannot reach the device.
    #[snafu(display("Device {} is not available", device))]
    DeviceUnavailable { device: Device, backtrace: Backtrace },
    /// The device does not support the sample type.
    #[snafu(display("Device {} does not support {} samples", device, dtype))]
    UnsupportedOnDevice {
        device: Device,
        dtype: Dtype,
        backtrace: Backtrace,
    },
    /// Any other failure of a custom placement.
    #[snafu(display("Could not place tensor on {}: {}", device, message))]
    Other {
        device: Device,
        message: String,
        backtrace: Backtrace,
    },
}

/// A decoded pixel tensor on its device.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pixels: PixelTensor,
    device: Device,
}

impl Tensor {
    /// Bind samples to the device holding them.
    pub fn new(pixels: PixelTensor, device: Device) -> Self {
        Tensor { pixels, device }
    }

    pub fn pixels(&self) -> &PixelTensor {
        &self.pixels
    }

    pub fn into_pixels(self) -> PixelTensor {
        self.pixels
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

/// A policy moving decoded samples onto a device.
pub trait Placement: fmt::Debug + Send + Sync {
    /// Place the samples on `device`.
    fn place(&self, pixels: PixelTensor, device: &Device) -> Result<Tensor, PlacementError>;
}

/// The default placement, which keeps samples in host memory
/// and reports every accelerator as unavailable.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HostPlacement;

impl Placement for HostPlacement {
    fn place(&self, pixels: PixelTensor, device: &Device) -> Result<Tensor, PlacementError> {
        snafu::ensure!(
            device.is_cpu(),
            DeviceUnavailableSnafu {
                device: device.clone()
            }
        );
        Ok(Tensor::new(pixels, Device::Cpu))
    }
}
