//! Rust bindings for the OpenCV DNN module.
//!
//! OpenCV's DNN module loads networks trained in Caffe, TensorFlow, ONNX,
//! Torch and Darknet and runs their forward pass. This crate wraps a thin C
//! shim over `cv::dnn`, providing safe Rust types for Net (a loaded
//! network) and Mat (an image or blob), plus blob helpers.
//!
//! # Usage
//!
//! ```no_run
//! use giztoy_dnn::{blob_from_image, ImreadFlags, Mat, Net, Scalar, Size};
//!
//! let mut net = Net::read_net("res10_300x300.caffemodel", "deploy.prototxt").unwrap();
//! let img = Mat::imread("face.jpg", ImreadFlags::Color).unwrap();
//! let blob = blob_from_image(&img, 1.0, Size::new(300, 300), [104.0, 177.0, 123.0].into(), false, false)
//!     .unwrap();
//! net.set_input(&blob, "").unwrap();
//! let detections = net.forward("").unwrap();
//! let data = detections.to_f32_vec().unwrap();
//! ```
//!
//! # Linking
//!
//! By default the shim is loaded at runtime from `libgiztoy_dnn` (or the
//! path in `GIZTOY_DNN_LIBRARY`). With the `bundled` feature, `csrc/dnn.cpp`
//! is compiled into the binary and linked against the system OpenCV.
//!
//! # Thread Safety
//!
//! Net and Mat may be moved between threads but not shared. Independent
//! Nets can run in parallel.

mod blob;
mod config;
mod error;
mod ffi;
mod mat;
pub mod model;
mod net;
mod runtime;

#[cfg(test)]
mod fake;

pub use blob::{BlobSize, Scalar, Size, blob_from_image, blob_from_images, get_blob_channel, get_blob_size};
pub use config::{DnnConfig, ENV_BACKEND, ENV_LIBRARY, ENV_TARGET, ModelEntry};
pub use error::DnnError;
pub use mat::{ImreadFlags, Mat, MatType};
pub use model::{
    ModelInfo, ModelSource, is_registered, list_models, load_model, model_info, register_from_config,
    register_model, register_model_info, unregister_model,
};
pub use net::{Backend, ModelFormat, Net, Target};
pub use runtime::{LIBRARY_NAME, init, init_from_config, is_initialized};
