//! Safe wrapper for `cv::dnn::Net`, plus the backend/target/format tags.

use std::fmt;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::DnnError;
use crate::ffi::{self, ByteArray, CStrings, DnnApi, Mats, to_cstring};
use crate::mat::Mat;
use crate::runtime;

// ---------------------------------------------------------------------------
// Backend / Target / ModelFormat
// ---------------------------------------------------------------------------

/// Computation backend. Codes match `cv::dnn::Backend`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    #[default]
    #[serde(rename = "default")]
    Default = 0,
    #[serde(rename = "halide")]
    Halide = 1,
    #[serde(rename = "openvino")]
    OpenVino = 2,
    #[serde(rename = "opencv")]
    OpenCv = 3,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Backend::Default, Backend::Halide, Backend::OpenVino, Backend::OpenCv];

    /// Integer code passed to the native library.
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Backend::Default => "default",
            Backend::Halide => "halide",
            Backend::OpenVino => "openvino",
            Backend::OpenCv => "opencv",
        }
    }
}

impl TryFrom<i32> for Backend {
    type Error = DnnError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Backend::ALL
            .into_iter()
            .find(|b| b.code() == code)
            .ok_or_else(|| DnnError::InvalidArgument(format!("unknown backend code {code}")))
    }
}

impl FromStr for Backend {
    type Err = DnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Backend::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| DnnError::InvalidArgument(format!("unknown backend {s:?}")))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target device. Codes match `cv::dnn::Target`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[default]
    #[serde(rename = "cpu")]
    Cpu = 0,
    /// OpenCL, 32-bit floats.
    #[serde(rename = "opencl")]
    OpenCl = 1,
    /// OpenCL, 16-bit floats.
    #[serde(rename = "opencl_fp16")]
    OpenClFp16 = 2,
    /// Movidius VPU.
    #[serde(rename = "vpu")]
    Vpu = 3,
}

impl Target {
    pub const ALL: [Target; 4] = [Target::Cpu, Target::OpenCl, Target::OpenClFp16, Target::Vpu];

    /// Integer code passed to the native library.
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Target::Cpu => "cpu",
            Target::OpenCl => "opencl",
            Target::OpenClFp16 => "opencl_fp16",
            Target::Vpu => "vpu",
        }
    }
}

impl TryFrom<i32> for Target {
    type Error = DnnError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Target::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| DnnError::InvalidArgument(format!("unknown target code {code}")))
    }
}

impl FromStr for Target {
    type Err = DnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Target::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| DnnError::InvalidArgument(format!("unknown target {s:?}")))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialization format of a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Let the library detect the format from the file names.
    #[default]
    Auto,
    Caffe,
    TensorFlow,
    Onnx,
    Torch,
    Darknet,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 6] = [
        ModelFormat::Auto,
        ModelFormat::Caffe,
        ModelFormat::TensorFlow,
        ModelFormat::Onnx,
        ModelFormat::Torch,
        ModelFormat::Darknet,
    ];

    /// Framework name understood by `cv::dnn::readNet` for in-memory models.
    /// Empty for [`ModelFormat::Auto`].
    pub const fn framework(self) -> &'static str {
        match self {
            ModelFormat::Auto => "",
            ModelFormat::Caffe => "caffe",
            ModelFormat::TensorFlow => "tensorflow",
            ModelFormat::Onnx => "onnx",
            ModelFormat::Torch => "torch",
            ModelFormat::Darknet => "darknet",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ModelFormat::Auto => "auto",
            other => other.framework(),
        }
    }
}

impl FromStr for ModelFormat {
    type Err = DnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        ModelFormat::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| DnnError::InvalidArgument(format!("unknown model format {s:?}")))
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Net
// ---------------------------------------------------------------------------

/// A loaded network.
///
/// The foreign object is released by [`Net::close`] or when the Net is
/// dropped, whichever comes first. A Net may be moved to another thread but
/// not shared between threads.
pub struct Net {
    net: ffi::NetT,
    api: &'static DnnApi,
}

// cv::dnn::Net has no thread affinity; it just must not be used concurrently.
unsafe impl Send for Net {}

impl Net {
    /// Reads a network in any supported format. The format is deduced from
    /// the file names. `config` may be empty.
    pub fn read_net(model: &str, config: &str) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        let c_model = to_cstring(model)?;
        let c_config = to_cstring(config)?;
        let net = unsafe { (api.net_read_net)(c_model.as_ptr(), c_config.as_ptr()) };
        Self::wrap(api, net, model)
    }

    /// Reads a Caffe network: `.prototxt` topology and `.caffemodel` weights.
    pub fn read_net_from_caffe(prototxt: &str, caffe_model: &str) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        let c_proto = to_cstring(prototxt)?;
        let c_model = to_cstring(caffe_model)?;
        let net = unsafe { (api.net_read_net_from_caffe)(c_proto.as_ptr(), c_model.as_ptr()) };
        Self::wrap(api, net, caffe_model)
    }

    /// Reads a frozen TensorFlow graph (`.pb`).
    pub fn read_net_from_tensorflow(model: &str) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        Self::read_single(api, api.net_read_net_from_tensorflow, model)
    }

    /// Reads an ONNX model.
    pub fn read_net_from_onnx(model: &str) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        Self::read_single(api, api.net_read_net_from_onnx, model)
    }

    /// Reads a Torch7 model.
    pub fn read_net_from_torch(model: &str) -> Result<Self, DnnError> {
        let api = runtime::api()?;
        Self::read_single(api, api.net_read_net_from_torch, model)
    }

    /// Reads a network from in-memory model and config data.
    ///
    /// `format` must name a framework; [`ModelFormat::Auto`] is rejected
    /// because there is no file name to deduce it from.
    pub fn read_net_from_bytes(format: ModelFormat, model: &[u8], config: &[u8]) -> Result<Self, DnnError> {
        if format == ModelFormat::Auto {
            return Err(DnnError::InvalidArgument("in-memory models need an explicit format".into()));
        }
        if model.is_empty() {
            return Err(DnnError::EmptyData);
        }
        let api = runtime::api()?;
        let c_framework = to_cstring(format.framework())?;
        let model_buf = ByteArray::from_slice(model)?;
        let config_buf = ByteArray::from_slice(config)?;
        let net = unsafe { (api.net_read_net_bytes)(c_framework.as_ptr(), model_buf, config_buf) };
        Self::wrap(api, net, &format!("<{format} bytes>"))
    }

    fn read_single(
        api: &'static DnnApi,
        entry: unsafe extern "C" fn(*const c_char) -> ffi::NetT,
        model: &str,
    ) -> Result<Self, DnnError> {
        let c_model = to_cstring(model)?;
        let net = unsafe { entry(c_model.as_ptr()) };
        Self::wrap(api, net, model)
    }

    /// Takes ownership of a freshly loaded handle. An empty network is
    /// released and reported as [`DnnError::EmptyNet`].
    fn wrap(api: &'static DnnApi, net: ffi::NetT, model: &str) -> Result<Self, DnnError> {
        if net.is_null() {
            return Err(api.native_error("read_net"));
        }
        let net = Self { net, api };
        if net.is_empty() {
            let reason = api.last_error_message();
            tracing::warn!(model, reason = reason.as_deref().unwrap_or(""), "dnn: network has no layers");
            return Err(DnnError::EmptyNet {
                model: model.to_string(),
                reason,
            });
        }
        tracing::debug!(model, "dnn: network loaded");
        Ok(net)
    }

    fn handle(&self) -> Result<ffi::NetT, DnnError> {
        if self.net.is_null() {
            return Err(DnnError::Closed);
        }
        Ok(self.net)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> ffi::NetT {
        self.net
    }

    /// Returns true if the network has no layers. A closed Net is empty.
    pub fn is_empty(&self) -> bool {
        if self.net.is_null() {
            return true;
        }
        unsafe { (self.api.net_empty)(self.net) }
    }

    /// Binds `blob` as the input named `name`.
    ///
    /// Shape compatibility is checked by the library at forward time.
    pub fn set_input(&mut self, blob: &Mat, name: &str) -> Result<(), DnnError> {
        let net = self.handle()?;
        let mat = blob.handle()?;
        let c_name = to_cstring(name)?;
        unsafe { (self.api.net_set_input)(net, mat, c_name.as_ptr()) };
        self.check(&format!("set_input {name:?}"))
    }

    /// Runs a forward pass up to `output_name` and returns its output blob.
    /// An empty name selects the network's default output.
    ///
    /// Blocks the calling thread until the native computation finishes.
    pub fn forward(&mut self, output_name: &str) -> Result<Mat, DnnError> {
        let net = self.handle()?;
        let c_name = to_cstring(output_name)?;
        let start = Instant::now();
        let mat = unsafe { (self.api.net_forward)(net, c_name.as_ptr()) };
        if mat.is_null() {
            return Err(self.api.native_error(&format!("forward {output_name:?}")));
        }
        tracing::debug!(output = output_name, elapsed = ?start.elapsed(), "dnn: forward");
        Ok(Mat::from_raw(self.api, mat))
    }

    /// Runs one forward pass and returns the blobs of every layer in
    /// `names`, in the same order.
    pub fn forward_layers(&mut self, names: &[&str]) -> Result<Vec<Mat>, DnnError> {
        let net = self.handle()?;
        let c_names = names.iter().map(|n| to_cstring(n)).collect::<Result<Vec<_>, _>>()?;
        let mut ptrs: Vec<*const c_char> = c_names.iter().map(|c| c.as_ptr()).collect();
        let list = CStrings {
            strs: ptrs.as_mut_ptr(),
            length: c_int::try_from(ptrs.len())
                .map_err(|_| DnnError::InvalidArgument(format!("too many layers: {}", ptrs.len())))?,
        };

        let mut out = Mats {
            mats: ptr::null_mut(),
            length: 0,
        };
        let start = Instant::now();
        let ok = unsafe { (self.api.net_forward_layers)(net, &mut out, list) };
        if !ok {
            return Err(self.api.native_error(&format!("forward_layers {names:?}")));
        }

        let len = out.length.max(0) as usize;
        let mut blobs = Vec::with_capacity(len);
        unsafe {
            for i in 0..len {
                blobs.push(Mat::from_raw(self.api, *out.mats.add(i)));
            }
            (self.api.mats_close)(out);
        }
        tracing::debug!(outputs = ?names, elapsed = ?start.elapsed(), "dnn: forward");
        Ok(blobs)
    }

    /// Asks the network to use `backend`. Takes effect on the next forward.
    pub fn set_preferable_backend(&mut self, backend: Backend) -> Result<(), DnnError> {
        let net = self.handle()?;
        unsafe { (self.api.net_set_preferable_backend)(net, backend.code()) };
        self.check("set_preferable_backend")?;
        tracing::debug!(%backend, "dnn: preferable backend set");
        Ok(())
    }

    /// Asks the network to run on `target`. Takes effect on the next forward.
    pub fn set_preferable_target(&mut self, target: Target) -> Result<(), DnnError> {
        let net = self.handle()?;
        unsafe { (self.api.net_set_preferable_target)(net, target.code()) };
        self.check("set_preferable_target")?;
        tracing::debug!(%target, "dnn: preferable target set");
        Ok(())
    }

    /// Names of all layers, in network order.
    pub fn layer_names(&self) -> Result<Vec<String>, DnnError> {
        let net = self.handle()?;
        let list = unsafe { (self.api.net_get_layer_names)(net) };
        self.check("layer_names")?;
        Ok(self.api.take_cstrings(list))
    }

    /// Names of the layers whose outputs are not consumed by any other
    /// layer. These are the default forward outputs.
    pub fn unconnected_out_layer_names(&self) -> Result<Vec<String>, DnnError> {
        let net = self.handle()?;
        let list = unsafe { (self.api.net_get_unconnected_out_layers_names)(net) };
        self.check("unconnected_out_layer_names")?;
        Ok(self.api.take_cstrings(list))
    }

    /// Time the library spent in the last forward pass.
    pub fn perf_profile(&self) -> Result<Duration, DnnError> {
        let net = self.handle()?;
        let ticks = unsafe { (self.api.net_get_perf_profile)(net) };
        if ticks < 0 {
            return Err(self.api.native_error("perf_profile"));
        }
        let freq = unsafe { (self.api.tick_frequency)() };
        if freq <= 0.0 {
            return Err(DnnError::Native(format!("perf_profile: bad tick frequency {freq}")));
        }
        Ok(Duration::from_secs_f64(ticks as f64 / freq))
    }

    /// Releases the foreign network. Later calls do nothing.
    pub fn close(&mut self) {
        if !self.net.is_null() {
            unsafe { (self.api.net_close)(self.net) };
            self.net = ptr::null_mut();
            tracing::debug!("dnn: network closed");
        }
    }

    fn check(&self, call: &str) -> Result<(), DnnError> {
        match self.api.last_error_message() {
            Some(msg) => Err(DnnError::Native(format!("{call}: {msg}"))),
            None => Ok(()),
        }
    }
}

impl Drop for Net {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("closed", &self.net.is_null())
            .finish()
    }
}
