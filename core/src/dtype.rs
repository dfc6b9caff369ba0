//! Numeric sample types of the pixel tensor.

use crate::header::VR;
use snafu::Snafu;
use std::fmt;
use std::str::FromStr;

/// The element type of a pixel tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dtype {
    /// unsigned 8-bit integer
    U8,
    /// signed 8-bit integer
    I8,
    /// unsigned 16-bit integer
    U16,
    /// signed 16-bit integer
    I16,
    /// unsigned 32-bit integer
    U32,
    /// signed 32-bit integer
    I32,
    /// unsigned 64-bit integer
    U64,
    /// signed 64-bit integer
    I64,
    /// IEEE 754 half precision float
    F16,
    /// IEEE 754 single precision float
    F32,
    /// IEEE 754 double precision float
    F64,
}

/// Could not resolve a dtype name.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[non_exhaustive]
pub enum ParseDtypeError {
    /// The name does not denote any known dtype
    #[snafu(display("Unknown dtype `{}`", name))]
    UnknownDtype { name: String },
    /// The name denotes a dtype which pixel tensors cannot hold
    #[snafu(display("Unsupported dtype `{}`", name))]
    UnsupportedDtype { name: String },
}

impl Dtype {
    /// All supported dtypes.
    pub const ALL: [Dtype; 11] = [
        Dtype::U8,
        Dtype::I8,
        Dtype::U16,
        Dtype::I16,
        Dtype::U32,
        Dtype::I32,
        Dtype::U64,
        Dtype::I64,
        Dtype::F16,
        Dtype::F32,
        Dtype::F64,
    ];

    /// Size of a single sample in bytes.
    pub fn size(self) -> usize {
        match self {
            Dtype::U8 | Dtype::I8 => 1,
            Dtype::U16 | Dtype::I16 | Dtype::F16 => 2,
            Dtype::U32 | Dtype::I32 | Dtype::F32 => 4,
            Dtype::U64 | Dtype::I64 | Dtype::F64 => 8,
        }
    }

    /// Whether this is a floating point type.
    pub fn is_float(self) -> bool {
        matches!(self, Dtype::F16 | Dtype::F32 | Dtype::F64)
    }

    /// The canonical numpy style name (`uint16`, `float32`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Dtype::U8 => "uint8",
            Dtype::I8 => "int8",
            Dtype::U16 => "uint16",
            Dtype::I16 => "int16",
            Dtype::U32 => "uint32",
            Dtype::I32 => "int32",
            Dtype::U64 => "uint64",
            Dtype::I64 => "int64",
            Dtype::F16 => "float16",
            Dtype::F32 => "float32",
            Dtype::F64 => "float64",
        }
    }

    /// The short upper case name (`U16`, `F32`, ...),
    /// as used in tensor sidecar headers.
    pub fn short_name(self) -> &'static str {
        match self {
            Dtype::U8 => "U8",
            Dtype::I8 => "I8",
            Dtype::U16 => "U16",
            Dtype::I16 => "I16",
            Dtype::U32 => "U32",
            Dtype::I32 => "I32",
            Dtype::U64 => "U64",
            Dtype::I64 => "I64",
            Dtype::F16 => "F16",
            Dtype::F32 => "F32",
            Dtype::F64 => "F64",
        }
    }

    /// The single byte code used in the container header.
    pub fn code(self) -> u8 {
        match self {
            Dtype::U8 => 1,
            Dtype::I8 => 2,
            Dtype::U16 => 3,
            Dtype::I16 => 4,
            Dtype::U32 => 5,
            Dtype::I32 => 6,
            Dtype::U64 => 7,
            Dtype::I64 => 8,
            Dtype::F16 => 9,
            Dtype::F32 => 10,
            Dtype::F64 => 11,
        }
    }

    /// The value representation of a pixel data attribute
    /// holding samples of this type.
    pub fn pixel_data_vr(self) -> VR {
        match self {
            Dtype::U8 | Dtype::I8 => VR::OB,
            Dtype::F16 | Dtype::F32 => VR::OF,
            Dtype::F64 => VR::OD,
            _ => VR::OW,
        }
    }

    /// Whether a pixel data attribute with this value representation
    /// may hold samples of this type.
    ///
    /// Integer samples fit the byte and word representations,
    /// as well as the long or very long one of their own width.
    /// Float samples only fit the representation of their width.
    pub fn admits_pixel_data_vr(self, vr: VR) -> bool {
        match self {
            Dtype::U8 | Dtype::I8 | Dtype::U16 | Dtype::I16 => matches!(vr, VR::OB | VR::OW),
            Dtype::U32 | Dtype::I32 => matches!(vr, VR::OB | VR::OW | VR::OL),
            Dtype::U64 | Dtype::I64 => matches!(vr, VR::OB | VR::OW | VR::OV),
            Dtype::F16 | Dtype::F32 => vr == VR::OF,
            Dtype::F64 => vr == VR::OD,
        }
    }

    /// Resolve a header dtype code.
    pub fn from_code(code: u8) -> Option<Self> {
        Dtype::ALL.iter().copied().find(|d| d.code() == code)
    }
}

/// Resolve a dtype from its numpy, torch or short name,
/// case-insensitively and with an optional `torch.` or `numpy.` prefix.
impl FromStr for Dtype {
    type Err = ParseDtypeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.trim().to_ascii_lowercase();
        let bare = lower
            .strip_prefix("torch.")
            .or_else(|| lower.strip_prefix("numpy."))
            .or_else(|| lower.strip_prefix("np."))
            .unwrap_or(&lower);
        let dtype = match bare {
            "uint8" | "u8" => Dtype::U8,
            "int8" | "i8" => Dtype::I8,
            "uint16" | "u16" => Dtype::U16,
            "int16" | "i16" | "short" => Dtype::I16,
            "uint32" | "u32" => Dtype::U32,
            "int32" | "i32" | "int" => Dtype::I32,
            "uint64" | "u64" => Dtype::U64,
            "int64" | "i64" | "long" => Dtype::I64,
            "float16" | "f16" | "half" => Dtype::F16,
            "float32" | "f32" | "float" => Dtype::F32,
            "float64" | "f64" | "double" => Dtype::F64,
            "bool" | "bfloat16" | "bf16" | "complex32" | "complex64" | "complex128"
            | "cfloat" | "cdouble" | "chalf" | "c64" | "c128" => {
                return UnsupportedDtypeSnafu { name }.fail()
            }
            _ => return UnknownDtypeSnafu { name }.fail(),
        };
        Ok(dtype)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
