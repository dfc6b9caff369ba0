//! The pixel tensor: a dense, row-major, little endian sample buffer
//! with a dtype and a shape.

use crate::dtype::Dtype;
use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use num_traits::AsPrimitive;
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};

/// An error when building or accessing a pixel tensor.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum TensorError {
    /// The sample buffer does not hold exactly one sample per element.
    #[snafu(display(
        "Tensor of shape {:?} and dtype {} needs {} bytes, got {}",
        shape,
        dtype,
        expected,
        actual
    ))]
    SizeMismatch {
        dtype: Dtype,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
        backtrace: Backtrace,
    },
    /// The number of elements overflows the address space.
    #[snafu(display("Tensor shape {:?} is too large", shape))]
    ShapeOverflow {
        shape: Vec<usize>,
        backtrace: Backtrace,
    },
    /// The samples were requested in a type other than the tensor's dtype.
    #[snafu(display("Tensor holds {} samples, requested {}", actual, requested))]
    DtypeMismatch {
        requested: Dtype,
        actual: Dtype,
        backtrace: Backtrace,
    },
    /// Could not build an array view of the samples.
    #[snafu(display("Could not shape tensor samples into an array"))]
    Shape {
        source: ndarray::ShapeError,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = TensorError> = std::result::Result<T, E>;

/// Description of a tensor without its samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorInfo {
    /// Sample type
    pub dtype: Dtype,
    /// Extent of each dimension, outermost first
    pub shape: Vec<usize>,
}

impl TensorInfo {
    /// Create a tensor description.
    pub fn new(dtype: Dtype, shape: impl Into<Vec<usize>>) -> Self {
        TensorInfo {
            dtype,
            shape: shape.into(),
        }
    }

    /// Total number of elements, or `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Total number of sample bytes, or `None` on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.size())
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// A primitive type which can be a pixel tensor sample.
pub trait Element: Copy + Send + Sync + std::fmt::Debug + 'static {
    /// The dtype of this sample type.
    const DTYPE: Dtype;

    /// Decode one sample from the start of a little endian buffer.
    fn read_le(bytes: &[u8]) -> Self;

    /// Append the little endian form of this sample.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($t: ty, $dtype: ident, $read: expr, $write: expr) => {
        impl Element for $t {
            const DTYPE: Dtype = Dtype::$dtype;

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                $read(bytes)
            }

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                $write(&mut buf[..], self);
                out.extend_from_slice(&buf);
            }
        }
    };
}

impl_element!(u8, U8, |b: &[u8]| b[0], |buf: &mut [u8], v| buf[0] = v);
impl_element!(i8, I8, |b: &[u8]| b[0] as i8, |buf: &mut [u8], v: i8| buf[0] =
    v as u8);
impl_element!(u16, U16, LittleEndian::read_u16, LittleEndian::write_u16);
impl_element!(i16, I16, LittleEndian::read_i16, LittleEndian::write_i16);
impl_element!(u32, U32, LittleEndian::read_u32, LittleEndian::write_u32);
impl_element!(i32, I32, LittleEndian::read_i32, LittleEndian::write_i32);
impl_element!(u64, U64, LittleEndian::read_u64, LittleEndian::write_u64);
impl_element!(i64, I64, LittleEndian::read_i64, LittleEndian::write_i64);
impl_element!(
    f16,
    F16,
    |b: &[u8]| f16::from_bits(LittleEndian::read_u16(b)),
    |buf: &mut [u8], v: f16| LittleEndian::write_u16(buf, v.to_bits())
);
impl_element!(f32, F32, LittleEndian::read_f32, LittleEndian::write_f32);
impl_element!(f64, F64, LittleEndian::read_f64, LittleEndian::write_f64);

/// Decode a little endian sample buffer into typed samples.
pub fn decode_samples<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.size())
        .map(T::read_le)
        .collect()
}

/// Encode typed samples into a little endian sample buffer.
pub fn encode_samples<T: Element>(samples: impl IntoIterator<Item = T>) -> Vec<u8> {
    let mut out = Vec::new();
    for s in samples {
        s.write_le(&mut out);
    }
    out
}

/// A dense pixel tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTensor {
    info: TensorInfo,
    data: Vec<u8>,
}

impl PixelTensor {
    /// Create a tensor from its little endian sample bytes.
    pub fn new(dtype: Dtype, shape: impl Into<Vec<usize>>, data: Vec<u8>) -> Result<Self> {
        let info = TensorInfo::new(dtype, shape);
        let expected = info.byte_len().context(ShapeOverflowSnafu {
            shape: info.shape.clone(),
        })?;
        ensure!(
            expected == data.len(),
            SizeMismatchSnafu {
                dtype,
                shape: info.shape.clone(),
                expected,
                actual: data.len(),
            }
        );
        Ok(PixelTensor { info, data })
    }

    /// Create a tensor from typed samples in row-major order.
    pub fn from_vec<T: Element>(shape: impl Into<Vec<usize>>, samples: Vec<T>) -> Result<Self> {
        PixelTensor::new(T::DTYPE, shape, encode_samples(samples))
    }

    /// Create a tensor from an array of any memory layout,
    /// taking its elements in logical row-major order.
    pub fn from_array<T, S, D>(array: &ArrayBase<S, D>) -> Self
    where
        T: Element,
        S: Data<Elem = T>,
        D: Dimension,
    {
        PixelTensor {
            info: TensorInfo::new(T::DTYPE, array.shape()),
            data: encode_samples(array.iter().copied()),
        }
    }

    /// The tensor's description.
    pub fn info(&self) -> &TensorInfo {
        &self.info
    }

    /// The sample type.
    pub fn dtype(&self) -> Dtype {
        self.info.dtype
    }

    /// The extent of each dimension.
    pub fn shape(&self) -> &[usize] {
        &self.info.shape
    }

    /// The raw little endian sample bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Move the sample bytes out of the tensor.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.info.dtype.size()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the samples into a vector of the tensor's own type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        ensure!(
            T::DTYPE == self.info.dtype,
            DtypeMismatchSnafu {
                requested: T::DTYPE,
                actual: self.info.dtype,
            }
        );
        Ok(decode_samples(&self.data))
    }

    /// Decode the samples into an n-dimensional array
    /// of the tensor's own type.
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        let samples = self.to_vec::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&self.info.shape), samples).context(ShapeSnafu)
    }

    /// Convert the samples to another dtype
    /// with the semantics of a numeric `as` cast:
    /// widening is exact, narrowing wraps for integers,
    /// and float to integer conversion saturates.
    pub fn convert(&self, target: Dtype) -> PixelTensor {
        if target == self.info.dtype {
            return self.clone();
        }
        PixelTensor {
            info: TensorInfo::new(target, self.info.shape.clone()),
            data: convert_bytes(&self.data, self.info.dtype, target),
        }
    }
}

/// Invoke `$body` with `$t` bound to the primitive type of `$dtype`.
/// Half precision is handled through `f32`.
macro_rules! with_primitive {
    ($dtype: expr, $t: ident => $body: expr) => {
        match $dtype {
            Dtype::U8 => {
                type $t = u8;
                $body
            }
            Dtype::I8 => {
                type $t = i8;
                $body
            }
            Dtype::U16 => {
                type $t = u16;
                $body
            }
            Dtype::I16 => {
                type $t = i16;
                $body
            }
            Dtype::U32 => {
                type $t = u32;
                $body
            }
            Dtype::I32 => {
                type $t = i32;
                $body
            }
            Dtype::U64 => {
                type $t = u64;
                $body
            }
            Dtype::I64 => {
                type $t = i64;
                $body
            }
            Dtype::F16 | Dtype::F32 => {
                type $t = f32;
                $body
            }
            Dtype::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

fn widen<S>(bytes: &[u8], from: Dtype) -> Vec<S>
where
    S: Element,
    f16: AsPrimitive<S>,
{
    if from == Dtype::F16 {
        decode_samples::<f16>(bytes)
            .into_iter()
            .map(|v| AsPrimitive::<S>::as_(v))
            .collect()
    } else {
        decode_samples::<S>(bytes)
    }
}

fn narrow<S, T>(samples: Vec<S>, to: Dtype) -> Vec<u8>
where
    S: AsPrimitive<T> + AsPrimitive<f32>,
    T: Element,
{
    if to == Dtype::F16 {
        encode_samples(samples.into_iter().map(|s| {
            let v: f32 = s.as_();
            f16::from_f32(v)
        }))
    } else {
        encode_samples(samples.into_iter().map(AsPrimitive::<T>::as_))
    }
}

/// Convert a little endian sample buffer between dtypes
/// with numeric `as` semantics.
pub fn convert_bytes(bytes: &[u8], from: Dtype, to: Dtype) -> Vec<u8> {
    if from == to {
        return bytes.to_vec();
    }
    with_primitive!(from, S => {
        let samples: Vec<S> = widen::<S>(bytes, from);
        with_primitive!(to, T => narrow::<S, T>(samples, to))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, s, Array3};
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_wrong_byte_count() {
        let err = PixelTensor::new(Dtype::U16, vec![2, 3], vec![0; 11]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::SizeMismatch {
                expected: 12,
                actual: 11,
                ..
            }
        ));
    }

    #[test]
    fn ndarray_roundtrip_in_logical_order() {
        let a = arr2(&[[1u16, 2, 3], [4, 5, 6]]);
        // transposed view: logical order differs from memory order
        let t = PixelTensor::from_array(&a.t());
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.to_vec::<u16>().unwrap(), vec![1, 4, 2, 5, 3, 6]);

        let back = t.to_ndarray::<u16>().unwrap();
        assert_eq!(back, a.t().into_dyn());
    }

    #[test]
    fn typed_access_checks_dtype() {
        let t = PixelTensor::from_vec(vec![3], vec![1u8, 2, 3]).unwrap();
        assert!(matches!(
            t.to_vec::<u16>(),
            Err(TensorError::DtypeMismatch { .. })
        ));
    }

    #[test]
    fn widening_is_exact() {
        let t = PixelTensor::from_vec(vec![3], vec![0u8, 255, 128]).unwrap();
        assert_eq!(
            t.convert(Dtype::F32).to_vec::<f32>().unwrap(),
            vec![0.0, 255.0, 128.0]
        );
        assert_eq!(
            t.convert(Dtype::F16).to_vec::<f16>().unwrap(),
            vec![f16::from_f32(0.0), f16::from_f32(255.0), f16::from_f32(128.0)]
        );
        assert_eq!(
            t.convert(Dtype::I64).to_vec::<i64>().unwrap(),
            vec![0, 255, 128]
        );
    }

    #[test]
    fn narrowing_follows_cast_semantics() {
        let t = PixelTensor::from_vec(vec![4], vec![-1.5f32, 300.7, 1e10, f32::NAN]).unwrap();
        assert_eq!(
            t.convert(Dtype::U8).to_vec::<u8>().unwrap(),
            vec![0, 255, 255, 0]
        );

        let t = PixelTensor::from_vec(vec![2], vec![65535u16, 256]).unwrap();
        assert_eq!(t.convert(Dtype::U8).to_vec::<u8>().unwrap(), vec![255, 0]);
        assert_eq!(t.convert(Dtype::I16).to_vec::<i16>().unwrap(), vec![-1, 256]);
    }

    #[test]
    fn half_precision_source() {
        let t = PixelTensor::from_vec(vec![2], vec![f16::from_f32(1.5), f16::from_f32(-2.0)])
            .unwrap();
        assert_eq!(t.convert(Dtype::F64).to_vec::<f64>().unwrap(), vec![1.5, -2.0]);
        assert_eq!(t.convert(Dtype::I32).to_vec::<i32>().unwrap(), vec![1, -2]);
    }

    #[test]
    fn slicing_an_array_view() {
        let a = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as u32);
        let t = PixelTensor::from_array(&a.slice(s![.., 1.., ..2]));
        assert_eq!(t.shape(), &[2, 2, 2]);
        assert_eq!(
            t.to_vec::<u32>().unwrap(),
            vec![10, 11, 20, 21, 110, 111, 120, 121]
        );
    }
}
