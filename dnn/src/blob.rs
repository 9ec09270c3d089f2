//! Blob construction and inspection helpers.
//!
//! A blob is a 4-D `CV_32F` [`Mat`] in (N, C, H, W) order, the layout
//! [`Net::set_input`](crate::Net::set_input) expects and
//! [`Net::forward`](crate::Net::forward) returns.

use std::fmt;
use std::os::raw::c_int;

use serde::{Deserialize, Serialize};

use crate::error::DnnError;
use crate::ffi::{self, CScalar, CSize, Mats};
use crate::mat::{Mat, MatType};

/// Four-component value, used for per-channel means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scalar {
    pub val1: f64,
    pub val2: f64,
    pub val3: f64,
    pub val4: f64,
}

impl Scalar {
    pub const fn new(val1: f64, val2: f64, val3: f64, val4: f64) -> Self {
        Self { val1, val2, val3, val4 }
    }

    /// Same value in every component.
    pub const fn all(v: f64) -> Self {
        Self::new(v, v, v, v)
    }

    fn to_c(self) -> CScalar {
        CScalar {
            val1: self.val1,
            val2: self.val2,
            val3: self.val3,
            val4: self.val4,
        }
    }
}

impl From<[f64; 3]> for Scalar {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2], 0.0)
    }
}

impl From<[f64; 4]> for Scalar {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn to_c(self) -> CSize {
        CSize {
            width: self.width,
            height: self.height,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Shape of a 4-D blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSize {
    /// Number of images.
    pub n: usize,
    /// Channels per image.
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl BlobSize {
    /// Total number of values.
    pub const fn len(&self) -> usize {
        self.n * self.c * self.h * self.w
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for BlobSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.n, self.c, self.h, self.w)
    }
}

/// Creates a 1-image blob from `image`.
///
/// The image is resized (and center-cropped when `crop` is set) to `size`,
/// the first and third channels are swapped when `swap_rb` is set, `mean`
/// is subtracted per channel and the result is multiplied by
/// `scale_factor`. The exact arithmetic is the library's.
pub fn blob_from_image(
    image: &Mat,
    scale_factor: f64,
    size: Size,
    mean: Scalar,
    swap_rb: bool,
    crop: bool,
) -> Result<Mat, DnnError> {
    let img = image.handle()?;
    let api = image.api();
    let blob = unsafe { (api.net_blob_from_image)(img, scale_factor, size.to_c(), mean.to_c(), swap_rb, crop) };
    if blob.is_null() {
        return Err(api.native_error("blob_from_image"));
    }
    Ok(Mat::from_raw(api, blob))
}

/// Creates an N-image blob, one entry per image, with the same
/// preprocessing as [`blob_from_image`].
pub fn blob_from_images(
    images: &[&Mat],
    scale_factor: f64,
    size: Size,
    mean: Scalar,
    swap_rb: bool,
    crop: bool,
) -> Result<Mat, DnnError> {
    let first = images.first().ok_or(DnnError::EmptyData)?;
    let api = first.api();
    let mut ptrs = images.iter().map(|m| m.handle()).collect::<Result<Vec<ffi::MatT>, _>>()?;
    let list = Mats {
        mats: ptrs.as_mut_ptr(),
        length: c_int::try_from(ptrs.len())
            .map_err(|_| DnnError::InvalidArgument(format!("too many images: {}", ptrs.len())))?,
    };
    let blob = unsafe { (api.net_blob_from_images)(list, scale_factor, size.to_c(), mean.to_c(), swap_rb, crop) };
    if blob.is_null() {
        return Err(api.native_error("blob_from_images"));
    }
    Ok(Mat::from_raw(api, blob))
}

/// Reads the (N, C, H, W) shape of a 4-D blob.
pub fn get_blob_size(blob: &Mat) -> Result<BlobSize, DnnError> {
    let mat = blob.handle()?;
    let api = blob.api();
    let s = unsafe { (api.net_get_blob_size)(mat) };
    if let Some(msg) = api.last_error_message() {
        return Err(DnnError::Native(format!("get_blob_size: {msg}")));
    }
    Ok(BlobSize {
        n: s.val1 as usize,
        c: s.val2 as usize,
        h: s.val3 as usize,
        w: s.val4 as usize,
    })
}

/// Extracts one (H, W) plane from a blob as a `CV_32F` matrix.
///
/// Both indices are zero-based and checked against the blob's shape before
/// the native call.
pub fn get_blob_channel(blob: &Mat, image_index: usize, channel_index: usize) -> Result<Mat, DnnError> {
    let size = get_blob_size(blob)?;
    let depth = blob.mat_type().depth();
    if depth != MatType::CV_32F {
        return Err(DnnError::InvalidArgument(format!("blob depth {depth} is not CV_32F")));
    }
    if image_index >= size.n {
        return Err(DnnError::IndexOutOfRange {
            axis: "image",
            index: image_index,
            len: size.n,
        });
    }
    if channel_index >= size.c {
        return Err(DnnError::IndexOutOfRange {
            axis: "channel",
            index: channel_index,
            len: size.c,
        });
    }

    let mat = blob.handle()?;
    let api = blob.api();
    // Both indices are below extents that came from c_int dimensions.
    let plane = unsafe { (api.net_get_blob_channel)(mat, image_index as c_int, channel_index as c_int) };
    if plane.is_null() {
        return Err(api.native_error("get_blob_channel"));
    }
    Ok(Mat::from_raw(api, plane))
}
