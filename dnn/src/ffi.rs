//! Raw FFI bindings for the C shim in `csrc/dnn.h`.
//!
//! The shim is reached through [`DnnApi`], a table of function pointers.
//! By default the table is resolved from a shared library at runtime; with
//! the `bundled` feature it points at the statically linked symbols instead.
//! The declarations are hand-written to match the header.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::path::Path;

use libloading::Library;

use crate::error::DnnError;

/// Opaque `cv::Mat`.
pub enum CvMat {}
/// Opaque `cv::dnn::Net`.
pub enum CvNet {}

pub type MatT = *mut CvMat;
pub type NetT = *mut CvNet;

/// `struct Size` — two ints.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSize {
    pub width: c_int,
    pub height: c_int,
}

/// `struct Scalar` — four doubles.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CScalar {
    pub val1: c_double,
    pub val2: c_double,
    pub val3: c_double,
    pub val4: c_double,
}

/// `struct ByteArray` — borrowed bytes, not owned by either side.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteArray {
    pub data: *const c_char,
    pub length: c_int,
}

/// `struct CStrings` — allocated by the shim, freed with `CStrings_Close`.
/// When passed into the shim, the caller keeps ownership.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CStrings {
    pub strs: *mut *const c_char,
    pub length: c_int,
}

/// `struct Mats` — array of Mat handles.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Mats {
    pub mats: *mut MatT,
    pub length: c_int,
}

impl ByteArray {
    pub fn from_slice(data: &[u8]) -> Result<Self, DnnError> {
        let length = c_int::try_from(data.len())
            .map_err(|_| DnnError::InvalidArgument(format!("buffer too large: {} bytes", data.len())))?;
        Ok(Self {
            data: data.as_ptr() as *const c_char,
            length,
        })
    }
}

/// Marshals a Rust string into a NUL-terminated C string.
pub fn to_cstring(s: &str) -> Result<CString, DnnError> {
    CString::new(s).map_err(|e| DnnError::InvalidArgument(format!("{s:?}: {e}")))
}

macro_rules! dnn_api {
    ($( $field:ident = $sym:literal : fn($($arg:ty),*) $(-> $ret:ty)?; )*) => {
        /// Function table for the C shim.
        pub struct DnnApi {
            // Keeps the shared library mapped while the table is alive.
            pub(crate) _lib: Option<Library>,
            $( pub $field: unsafe extern "C" fn($($arg),*) $(-> $ret)?, )*
        }

        impl DnnApi {
            /// Resolves every shim symbol from the shared library at `path`.
            pub fn load(path: &Path) -> Result<Self, DnnError> {
                let display = path.display().to_string();
                let lib = unsafe { Library::new(path) }.map_err(|e| DnnError::Library {
                    path: display.clone(),
                    reason: e.to_string(),
                })?;
                $(
                    let $field = unsafe {
                        *lib.get::<unsafe extern "C" fn($($arg),*) $(-> $ret)?>(concat!($sym, "\0").as_bytes())
                            .map_err(|e| DnnError::Library {
                                path: display.clone(),
                                reason: format!("{}: {e}", $sym),
                            })?
                    };
                )*
                Ok(Self { _lib: Some(lib), $( $field, )* })
            }

            /// Binds the table to the shim compiled into this binary.
            #[cfg(feature = "bundled")]
            pub fn linked() -> Self {
                Self { _lib: None, $( $field: linked::$field, )* }
            }
        }

        #[cfg(feature = "bundled")]
        mod linked {
            #[allow(unused_imports)]
            use super::*;

            unsafe extern "C" {
                $(
                    #[link_name = $sym]
                    pub fn $field($(_: $arg),*) $(-> $ret)?;
                )*
            }
        }
    };
}

dnn_api! {
    last_error = "Dnn_LastError": fn() -> *const c_char;
    tick_frequency = "Dnn_TickFrequency": fn() -> c_double;
    cstrings_close = "CStrings_Close": fn(CStrings);
    mats_close = "Mats_Close": fn(Mats);

    mat_new_from_bytes = "Mat_NewFromBytes": fn(c_int, c_int, c_int, ByteArray) -> MatT;
    mat_close = "Mat_Close": fn(MatT);
    mat_empty = "Mat_Empty": fn(MatT) -> bool;
    mat_rows = "Mat_Rows": fn(MatT) -> c_int;
    mat_cols = "Mat_Cols": fn(MatT) -> c_int;
    mat_channels = "Mat_Channels": fn(MatT) -> c_int;
    mat_type = "Mat_Type": fn(MatT) -> c_int;
    mat_total = "Mat_Total": fn(MatT) -> usize;
    mat_data_ptr = "Mat_DataPtr": fn(MatT) -> ByteArray;
    image_imread = "Image_IMRead": fn(*const c_char, c_int) -> MatT;

    net_read_net = "Net_ReadNet": fn(*const c_char, *const c_char) -> NetT;
    net_read_net_bytes = "Net_ReadNetBytes": fn(*const c_char, ByteArray, ByteArray) -> NetT;
    net_read_net_from_caffe = "Net_ReadNetFromCaffe": fn(*const c_char, *const c_char) -> NetT;
    net_read_net_from_tensorflow = "Net_ReadNetFromTensorflow": fn(*const c_char) -> NetT;
    net_read_net_from_onnx = "Net_ReadNetFromONNX": fn(*const c_char) -> NetT;
    net_read_net_from_torch = "Net_ReadNetFromTorch": fn(*const c_char) -> NetT;
    net_close = "Net_Close": fn(NetT);
    net_empty = "Net_Empty": fn(NetT) -> bool;
    net_set_input = "Net_SetInput": fn(NetT, MatT, *const c_char);
    net_forward = "Net_Forward": fn(NetT, *const c_char) -> MatT;
    net_forward_layers = "Net_ForwardLayers": fn(NetT, *mut Mats, CStrings) -> bool;
    net_set_preferable_backend = "Net_SetPreferableBackend": fn(NetT, c_int);
    net_set_preferable_target = "Net_SetPreferableTarget": fn(NetT, c_int);
    net_get_layer_names = "Net_GetLayerNames": fn(NetT) -> CStrings;
    net_get_unconnected_out_layers_names = "Net_GetUnconnectedOutLayersNames": fn(NetT) -> CStrings;
    net_get_perf_profile = "Net_GetPerfProfile": fn(NetT) -> i64;

    net_blob_from_image = "Net_BlobFromImage": fn(MatT, c_double, CSize, CScalar, bool, bool) -> MatT;
    net_blob_from_images = "Net_BlobFromImages": fn(Mats, c_double, CSize, CScalar, bool, bool) -> MatT;
    net_get_blob_channel = "Net_GetBlobChannel": fn(MatT, c_int, c_int) -> MatT;
    net_get_blob_size = "Net_GetBlobSize": fn(MatT) -> CScalar;
}

impl DnnApi {
    /// Returns the error the shim recorded for the last call on this thread.
    pub(crate) fn last_error_message(&self) -> Option<String> {
        unsafe {
            let ptr = (self.last_error)();
            if ptr.is_null() {
                return None;
            }
            Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
        }
    }

    /// Builds a [`DnnError::Native`] from the last recorded error.
    pub(crate) fn native_error(&self, call: &str) -> DnnError {
        match self.last_error_message() {
            Some(msg) => DnnError::Native(format!("{call}: {msg}")),
            None => DnnError::Native(format!("{call} failed")),
        }
    }

    /// Copies a shim-allocated string list into Rust and frees it.
    pub(crate) fn take_cstrings(&self, list: CStrings) -> Vec<String> {
        if list.strs.is_null() {
            return Vec::new();
        }
        let len = list.length.max(0) as usize;
        let mut out = Vec::with_capacity(len);
        unsafe {
            for i in 0..len {
                let ptr = *list.strs.add(i);
                if !ptr.is_null() {
                    out.push(CStr::from_ptr(ptr).to_string_lossy().into_owned());
                }
            }
            (self.cstrings_close)(list);
        }
        out
    }
}
