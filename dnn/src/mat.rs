//! Safe wrapper for `cv::Mat`, used for both images and blobs.

use std::fmt;
use std::ptr;

use crate::error::DnnError;
use crate::ffi::{self, ByteArray, DnnApi, to_cstring};
use crate::runtime;

/// OpenCV matrix type code: depth in the low three bits, channel count
/// minus one above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatType(pub i32);

impl MatType {
    pub const CV_8U: i32 = 0;
    pub const CV_8S: i32 = 1;
    pub const CV_16U: i32 = 2;
    pub const CV_16S: i32 = 3;
    pub const CV_32S: i32 = 4;
    pub const CV_32F: i32 = 5;
    pub const CV_64F: i32 = 6;
    pub const CV_16F: i32 = 7;

    pub const CV_8UC1: MatType = MatType::make(MatType::CV_8U, 1);
    pub const CV_8UC3: MatType = MatType::make(MatType::CV_8U, 3);
    pub const CV_8UC4: MatType = MatType::make(MatType::CV_8U, 4);
    pub const CV_32FC1: MatType = MatType::make(MatType::CV_32F, 1);
    pub const CV_32FC3: MatType = MatType::make(MatType::CV_32F, 3);

    pub const fn make(depth: i32, channels: i32) -> MatType {
        MatType((depth & 7) + ((channels - 1) << 3))
    }

    pub const fn depth(self) -> i32 {
        self.0 & 7
    }

    pub const fn channels(self) -> i32 {
        (self.0 >> 3) + 1
    }

    /// Size in bytes of one channel value.
    pub const fn elem_size1(self) -> usize {
        match self.depth() {
            MatType::CV_8U | MatType::CV_8S => 1,
            MatType::CV_16U | MatType::CV_16S | MatType::CV_16F => 2,
            MatType::CV_32S | MatType::CV_32F => 4,
            _ => 8,
        }
    }

    /// Size in bytes of one element (all channels).
    pub const fn elem_size(self) -> usize {
        self.elem_size1() * self.channels() as usize
    }
}

/// Flags for [`Mat::imread`]. Codes match `cv::ImreadModes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImreadFlags {
    Unchanged = -1,
    Grayscale = 0,
    #[default]
    Color = 1,
}

/// A matrix owned by the native library.
///
/// Released by [`Mat::close`] or on drop. Accessors on a closed Mat report
/// an empty matrix.
pub struct Mat {
    mat: ffi::MatT,
    api: &'static DnnApi,
}

unsafe impl Send for Mat {}

impl Mat {
    /// Creates a `rows x cols` matrix of `mat_type`, copying `data` into
    /// native memory. Extra trailing bytes are ignored.
    pub fn from_bytes(rows: i32, cols: i32, mat_type: MatType, data: &[u8]) -> Result<Self, DnnError> {
        if rows <= 0 || cols <= 0 {
            return Err(DnnError::InvalidArgument(format!("bad dimensions {rows}x{cols}")));
        }
        if data.is_empty() {
            return Err(DnnError::EmptyData);
        }
        let required = (rows as usize)
            .checked_mul(cols as usize)
            .and_then(|n| n.checked_mul(mat_type.elem_size()))
            .ok_or_else(|| DnnError::InvalidArgument(format!("dimensions {rows}x{cols} overflow")))?;
        if data.len() < required {
            return Err(DnnError::InvalidArgument(format!(
                "data too short: got {}, need {required} (rows={rows}, cols={cols}, type={})",
                data.len(),
                mat_type.0
            )));
        }

        let api = runtime::api()?;
        let buf = ByteArray::from_slice(&data[..required])?;
        let mat = unsafe { (api.mat_new_from_bytes)(rows, cols, mat_type.0, buf) };
        if mat.is_null() {
            return Err(api.native_error("mat_new_from_bytes"));
        }
        Ok(Self { mat, api })
    }

    /// Creates a `rows x cols` float matrix with `channels` interleaved
    /// channels.
    pub fn from_f32(rows: i32, cols: i32, channels: i32, data: &[f32]) -> Result<Self, DnnError> {
        if !(1..=4).contains(&channels) {
            return Err(DnnError::InvalidArgument(format!("bad channel count {channels}")));
        }
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::from_bytes(rows, cols, MatType::make(MatType::CV_32F, channels), &bytes)
    }

    /// Reads and decodes an image file. Color images come back in BGR order.
    pub fn imread(path: &str, flags: ImreadFlags) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        let c_path = to_cstring(path)?;
        let mat = unsafe { (api.image_imread)(c_path.as_ptr(), flags as i32) };
        if mat.is_null() {
            return Err(api.native_error(&format!("imread {path:?}")));
        }
        let mat = Self { mat, api };
        if mat.is_empty() {
            return Err(DnnError::Native(format!("imread {path:?}: no image decoded")));
        }
        Ok(mat)
    }

    /// Converts an [`image::DynamicImage`] into a Mat using OpenCV's channel
    /// order: luma becomes `CV_8UC1`, color `CV_8UC3` BGR, and images with
    /// alpha `CV_8UC4` BGRA.
    #[cfg(feature = "image")]
    pub fn from_image(img: &image::DynamicImage) -> Result<Self, DnnError> {
        use image::DynamicImage;

        let rows = i32::try_from(img.height()).map_err(|_| DnnError::InvalidArgument("image too tall".into()))?;
        let cols = i32::try_from(img.width()).map_err(|_| DnnError::InvalidArgument("image too wide".into()))?;

        match img {
            DynamicImage::ImageLuma8(buf) => Self::from_bytes(rows, cols, MatType::CV_8UC1, buf.as_raw()),
            img if img.color().has_alpha() => {
                let mut data = img.to_rgba8().into_raw();
                for px in data.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                Self::from_bytes(rows, cols, MatType::CV_8UC4, &data)
            }
            img => {
                let mut data = img.to_rgb8().into_raw();
                for px in data.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                Self::from_bytes(rows, cols, MatType::CV_8UC3, &data)
            }
        }
    }

    pub(crate) fn from_raw(api: &'static DnnApi, mat: ffi::MatT) -> Self {
        Self { mat, api }
    }

    pub(crate) fn handle(&self) -> Result<ffi::MatT, DnnError> {
        if self.mat.is_null() {
            return Err(DnnError::Closed);
        }
        Ok(self.mat)
    }

    pub(crate) fn api(&self) -> &'static DnnApi {
        self.api
    }

    /// Returns true if the matrix has no elements or has been closed.
    pub fn is_empty(&self) -> bool {
        if self.mat.is_null() {
            return true;
        }
        unsafe { (self.api.mat_empty)(self.mat) }
    }

    /// Number of rows; -1 for matrices with more than two dimensions.
    pub fn rows(&self) -> i32 {
        if self.mat.is_null() {
            return 0;
        }
        unsafe { (self.api.mat_rows)(self.mat) }
    }

    /// Number of columns; -1 for matrices with more than two dimensions.
    pub fn cols(&self) -> i32 {
        if self.mat.is_null() {
            return 0;
        }
        unsafe { (self.api.mat_cols)(self.mat) }
    }

    pub fn channels(&self) -> i32 {
        if self.mat.is_null() {
            return 0;
        }
        unsafe { (self.api.mat_channels)(self.mat) }
    }

    pub fn mat_type(&self) -> MatType {
        if self.mat.is_null() {
            return MatType(0);
        }
        MatType(unsafe { (self.api.mat_type)(self.mat) })
    }

    /// Total number of elements across all dimensions.
    pub fn total(&self) -> usize {
        if self.mat.is_null() {
            return 0;
        }
        unsafe { (self.api.mat_total)(self.mat) }
    }

    /// Borrows the raw element data.
    pub fn data_bytes(&self) -> Result<&[u8], DnnError> {
        let mat = self.handle()?;
        let buf = unsafe { (self.api.mat_data_ptr)(mat) };
        if buf.length < 0 {
            return Err(self.api.native_error("data_bytes"));
        }
        if buf.data.is_null() || buf.length == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(buf.data as *const u8, buf.length as usize) })
    }

    /// Copies the data of a `CV_32F` matrix.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, DnnError> {
        self.handle()?;
        let mat_type = self.mat_type();
        if mat_type.depth() != MatType::CV_32F {
            return Err(DnnError::InvalidArgument(format!(
                "expected CV_32F data, got type {}",
                mat_type.0
            )));
        }
        let bytes = self.data_bytes()?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Copies a 4-D blob into an (N, C, H, W) array.
    #[cfg(feature = "ndarray")]
    pub fn to_array4(&self) -> Result<ndarray::Array4<f32>, DnnError> {
        let size = crate::blob::get_blob_size(self)?;
        let data = self.to_f32_vec()?;
        ndarray::Array4::from_shape_vec((size.n, size.c, size.h, size.w), data)
            .map_err(|e| DnnError::InvalidArgument(format!("blob shape {size}: {e}")))
    }

    /// Releases the foreign matrix. Later calls do nothing.
    pub fn close(&mut self) {
        if !self.mat.is_null() {
            unsafe { (self.api.mat_close)(self.mat) };
            self.mat = ptr::null_mut();
        }
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> ffi::MatT {
        self.mat
    }
}

impl Drop for Mat {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Mat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mat")
            .field("rows", &self.rows())
            .field("cols", &self.cols())
            .field("type", &self.mat_type().0)
            .field("closed", &self.mat.is_null())
            .finish()
    }
}
