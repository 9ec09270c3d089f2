//! In-process stand-in for the C shim, used by unit tests.
//!
//! Implements every [`DnnApi`] entry point in Rust over tiny in-memory
//! networks and matrices, so the marshaling layer can be tested without
//! OpenCV. Handles are never freed: `*_Close` only counts calls, which lets
//! tests check that each handle is released exactly once.
//!
//! Fake model files are text, one layer name per line. The first layer is
//! the input; forwarding to the layer at index `k > 0` returns the input
//! scaled by `k`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_int};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ffi::{ByteArray, CScalar, CSize, CStrings, DnnApi, MatT, Mats, NetT};
use crate::mat::MatType;
use crate::runtime;

const TICKS_PER_FORWARD: i64 = 500;
const TICK_FREQUENCY: f64 = 1000.0;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

static EMPTY_NETS_RELEASED: AtomicUsize = AtomicUsize::new(0);

fn set_error(msg: impl Into<String>) {
    let msg = CString::new(msg.into().replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(msg));
}

fn clear_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
}

#[derive(Clone)]
struct FakeMat {
    dims: Vec<i32>,
    typ: i32,
    data: Vec<u8>,
    closes: usize,
}

impl FakeMat {
    fn empty() -> Self {
        Self::new(Vec::new(), 0, Vec::new())
    }

    fn new(dims: Vec<i32>, typ: i32, data: Vec<u8>) -> Self {
        Self {
            dims,
            typ,
            data,
            closes: 0,
        }
    }

    fn from_f32(dims: Vec<i32>, values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::new(dims, MatType::CV_32FC1.0, data)
    }

    fn total(&self) -> usize {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Channel value at element `idx`, channel `c`, as f32.
    fn value(&self, idx: usize, c: usize) -> f32 {
        let t = MatType(self.typ);
        let pos = idx * t.channels() as usize + c;
        match t.depth() {
            MatType::CV_32F => {
                let b = &self.data[pos * 4..pos * 4 + 4];
                f32::from_ne_bytes([b[0], b[1], b[2], b[3]])
            }
            _ => self.data[pos] as f32,
        }
    }

    fn f32_values(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    fn into_raw(self) -> MatT {
        Box::into_raw(Box::new(self)) as MatT
    }
}

struct FakeNet {
    layers: Vec<String>,
    input: Option<FakeMat>,
    backend: i32,
    target: i32,
    ticks: i64,
    closes: usize,
}

impl FakeNet {
    fn from_text(text: &str) -> Self {
        Self {
            layers: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            input: None,
            backend: 0,
            target: 0,
            ticks: -1,
            closes: 0,
        }
    }

    fn load(path: &str) -> NetT {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_text(&text).into_raw(),
            Err(e) => {
                set_error(format!("can't open {path:?}: {e}"));
                Self::from_text("").into_raw()
            }
        }
    }

    fn into_raw(self) -> NetT {
        Box::into_raw(Box::new(self)) as NetT
    }

    fn output(&mut self, name: &str) -> Result<FakeMat, String> {
        let idx = if name.is_empty() {
            self.layers.len().checked_sub(1).ok_or("network is empty")?
        } else {
            self.layers
                .iter()
                .position(|l| l == name)
                .ok_or_else(|| format!("layer {name:?} not found"))?
        };
        let input = self.input.as_ref().ok_or("no input set")?;
        self.ticks = TICKS_PER_FORWARD;
        if idx == 0 || MatType(input.typ).depth() != MatType::CV_32F {
            return Ok(FakeMat::new(input.dims.clone(), input.typ, input.data.clone()));
        }
        let scaled: Vec<f32> = input.f32_values().iter().map(|v| v * idx as f32).collect();
        Ok(FakeMat::from_f32(input.dims.clone(), &scaled))
    }
}

unsafe fn mat<'a>(m: MatT) -> &'a mut FakeMat {
    unsafe { &mut *(m as *mut FakeMat) }
}

unsafe fn net<'a>(n: NetT) -> &'a mut FakeNet {
    unsafe { &mut *(n as *mut FakeNet) }
}

unsafe fn string(s: *const c_char) -> String {
    unsafe { CStr::from_ptr(s).to_string_lossy().into_owned() }
}

unsafe fn bytes<'a>(b: ByteArray) -> &'a [u8] {
    if b.data.is_null() || b.length <= 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(b.data as *const u8, b.length as usize) }
}

fn to_cstrings(names: &[String]) -> CStrings {
    let ptrs: Vec<*const c_char> = names
        .iter()
        .map(|n| CString::new(n.as_str()).unwrap_or_default().into_raw() as *const c_char)
        .collect();
    let length = ptrs.len() as c_int;
    let strs = Box::into_raw(ptrs.into_boxed_slice()) as *mut *const c_char;
    CStrings { strs, length }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

unsafe extern "C" fn last_error() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ref().map_or(std::ptr::null(), |s| s.as_ptr()))
}

unsafe extern "C" fn tick_frequency() -> c_double {
    TICK_FREQUENCY
}

unsafe extern "C" fn cstrings_close(list: CStrings) {
    if list.strs.is_null() {
        return;
    }
    unsafe {
        let slice = std::ptr::slice_from_raw_parts_mut(list.strs, list.length as usize);
        let boxed = Box::from_raw(slice);
        for &s in boxed.iter() {
            drop(CString::from_raw(s as *mut c_char));
        }
    }
}

unsafe extern "C" fn mats_close(list: Mats) {
    if list.mats.is_null() {
        return;
    }
    unsafe {
        let slice = std::ptr::slice_from_raw_parts_mut(list.mats, list.length as usize);
        drop(Box::from_raw(slice));
    }
}

unsafe extern "C" fn mat_new_from_bytes(rows: c_int, cols: c_int, typ: c_int, buf: ByteArray) -> MatT {
    clear_error();
    let len = rows as usize * cols as usize * MatType(typ).elem_size();
    let data = unsafe { bytes(buf) };
    if data.len() < len {
        set_error("buffer too small");
        return std::ptr::null_mut();
    }
    FakeMat::new(vec![rows, cols], typ, data[..len].to_vec()).into_raw()
}

unsafe extern "C" fn mat_close(m: MatT) {
    unsafe { mat(m) }.closes += 1;
}

unsafe extern "C" fn mat_empty(m: MatT) -> bool {
    unsafe { mat(m) }.total() == 0
}

unsafe extern "C" fn mat_rows(m: MatT) -> c_int {
    let m = unsafe { mat(m) };
    if m.dims.len() == 2 { m.dims[0] } else { -1 }
}

unsafe extern "C" fn mat_cols(m: MatT) -> c_int {
    let m = unsafe { mat(m) };
    if m.dims.len() == 2 { m.dims[1] } else { -1 }
}

unsafe extern "C" fn mat_channels(m: MatT) -> c_int {
    MatType(unsafe { mat(m) }.typ).channels()
}

unsafe extern "C" fn mat_type(m: MatT) -> c_int {
    unsafe { mat(m) }.typ
}

unsafe extern "C" fn mat_total(m: MatT) -> usize {
    unsafe { mat(m) }.total()
}

unsafe extern "C" fn mat_data_ptr(m: MatT) -> ByteArray {
    clear_error();
    let m = unsafe { mat(m) };
    let len = m.total() * MatType(m.typ).elem_size();
    match c_int::try_from(len) {
        Ok(length) if len <= m.data.len() => ByteArray {
            data: m.data.as_ptr() as *const c_char,
            length,
        },
        Ok(_) => {
            set_error("matrix data missing");
            ByteArray { data: std::ptr::null(), length: -1 }
        }
        Err(_) => {
            set_error("matrix data exceeds 2 GiB");
            ByteArray { data: std::ptr::null(), length: -1 }
        }
    }
}

/// Reads a binary PPM (P6) file, returning BGR pixels.
unsafe extern "C" fn image_imread(path: *const c_char, _flags: c_int) -> MatT {
    clear_error();
    let path = unsafe { string(path) };
    let Ok(content) = std::fs::read(&path) else {
        return FakeMat::empty().into_raw();
    };
    let header: Vec<&[u8]> = content.splitn(5, |b| b.is_ascii_whitespace()).collect();
    if header.len() < 5 || header[0] != b"P6" {
        return FakeMat::empty().into_raw();
    }
    let parse = |b: &[u8]| std::str::from_utf8(b).ok().and_then(|s| s.parse::<i32>().ok());
    let (Some(w), Some(h)) = (parse(header[1]), parse(header[2])) else {
        return FakeMat::empty().into_raw();
    };
    let mut pixels = header[4].to_vec();
    pixels.truncate((w * h * 3) as usize);
    for px in pixels.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
    FakeMat::new(vec![h, w], MatType::CV_8UC3.0, pixels).into_raw()
}

unsafe extern "C" fn net_read_net(model: *const c_char, config: *const c_char) -> NetT {
    clear_error();
    let config = unsafe { string(config) };
    if !config.is_empty() && !Path::new(&config).exists() {
        set_error(format!("can't open {config:?}"));
        return FakeNet::from_text("").into_raw();
    }
    FakeNet::load(&unsafe { string(model) })
}

unsafe extern "C" fn net_read_net_bytes(framework: *const c_char, model: ByteArray, _config: ByteArray) -> NetT {
    clear_error();
    if unsafe { string(framework) }.is_empty() {
        set_error("framework required");
        return std::ptr::null_mut();
    }
    let text = String::from_utf8_lossy(unsafe { bytes(model) }).into_owned();
    let net = FakeNet::from_text(&text);
    if net.layers.is_empty() {
        set_error("no layers in model data");
    }
    net.into_raw()
}

unsafe extern "C" fn net_read_net_from_caffe(prototxt: *const c_char, _model: *const c_char) -> NetT {
    clear_error();
    FakeNet::load(&unsafe { string(prototxt) })
}

unsafe extern "C" fn net_read_net_single(model: *const c_char) -> NetT {
    clear_error();
    FakeNet::load(&unsafe { string(model) })
}

unsafe extern "C" fn net_close(n: NetT) {
    let n = unsafe { net(n) };
    n.closes += 1;
    if n.layers.is_empty() {
        EMPTY_NETS_RELEASED.fetch_add(1, Ordering::SeqCst);
    }
}

unsafe extern "C" fn net_empty(n: NetT) -> bool {
    unsafe { net(n) }.layers.is_empty()
}

unsafe extern "C" fn net_set_input(n: NetT, blob: MatT, name: *const c_char) {
    clear_error();
    let n = unsafe { net(n) };
    let name = unsafe { string(name) };
    if !name.is_empty() && n.layers.first() != Some(&name) {
        set_error(format!("input {name:?} not found"));
        return;
    }
    n.input = Some(unsafe { mat(blob) }.clone());
}

unsafe extern "C" fn net_forward(n: NetT, name: *const c_char) -> MatT {
    clear_error();
    let name = unsafe { string(name) };
    match unsafe { net(n) }.output(&name) {
        Ok(m) => m.into_raw(),
        Err(e) => {
            set_error(e);
            std::ptr::null_mut()
        }
    }
}

unsafe extern "C" fn net_forward_layers(n: NetT, out: *mut Mats, names: CStrings) -> bool {
    clear_error();
    let n = unsafe { net(n) };
    let mut mats = Vec::new();
    for i in 0..names.length as usize {
        let name = unsafe { string(*names.strs.add(i)) };
        match n.output(&name) {
            Ok(m) => mats.push(m.into_raw()),
            Err(e) => {
                set_error(e);
                return false;
            }
        }
    }
    let length = mats.len() as c_int;
    unsafe {
        (*out).mats = Box::into_raw(mats.into_boxed_slice()) as *mut MatT;
        (*out).length = length;
    }
    true
}

unsafe extern "C" fn net_set_preferable_backend(n: NetT, backend: c_int) {
    clear_error();
    unsafe { net(n) }.backend = backend;
}

unsafe extern "C" fn net_set_preferable_target(n: NetT, target: c_int) {
    clear_error();
    unsafe { net(n) }.target = target;
}

unsafe extern "C" fn net_get_layer_names(n: NetT) -> CStrings {
    clear_error();
    to_cstrings(&unsafe { net(n) }.layers)
}

unsafe extern "C" fn net_get_unconnected_out_layers_names(n: NetT) -> CStrings {
    clear_error();
    let n = unsafe { net(n) };
    to_cstrings(n.layers.last().map(std::slice::from_ref).unwrap_or_default())
}

unsafe extern "C" fn net_get_perf_profile(n: NetT) -> i64 {
    clear_error();
    let n = unsafe { net(n) };
    if n.ticks < 0 {
        set_error("no forward pass yet");
    }
    n.ticks
}

/// One preprocessed image as (C, H, W) planes.
struct Planes {
    c: usize,
    h: usize,
    w: usize,
    values: Vec<f32>,
}

/// Nearest-neighbour resize to `size`, optional R/B swap, then
/// `(v - mean) * scale`. `crop` is ignored.
fn blob_planes(img: &FakeMat, scale: f64, size: CSize, mean: CScalar, swap_rb: bool) -> Result<Planes, String> {
    if img.dims.len() != 2 {
        return Err("image must be 2-dimensional".into());
    }
    let (rows, cols) = (img.dims[0] as usize, img.dims[1] as usize);
    let c = MatType(img.typ).channels() as usize;
    let (w, h) = if size.width > 0 && size.height > 0 {
        (size.width as usize, size.height as usize)
    } else {
        (cols, rows)
    };
    let means = [mean.val1, mean.val2, mean.val3, mean.val4];

    let mut values = Vec::with_capacity(c * h * w);
    for ch in 0..c {
        let src = if swap_rb && c >= 3 && ch != 1 && ch < 3 { 2 - ch } else { ch };
        for y in 0..h {
            for x in 0..w {
                let v = img.value((y * rows / h) * cols + x * cols / w, src) as f64;
                values.push(((v - means[ch.min(3)]) * scale) as f32);
            }
        }
    }
    Ok(Planes { c, h, w, values })
}

unsafe extern "C" fn net_blob_from_image(
    img: MatT,
    scale: c_double,
    size: CSize,
    mean: CScalar,
    swap_rb: bool,
    _crop: bool,
) -> MatT {
    clear_error();
    match blob_planes(unsafe { mat(img) }, scale, size, mean, swap_rb) {
        Ok(p) => FakeMat::from_f32(vec![1, p.c as i32, p.h as i32, p.w as i32], &p.values).into_raw(),
        Err(e) => {
            set_error(e);
            std::ptr::null_mut()
        }
    }
}

unsafe extern "C" fn net_blob_from_images(
    images: Mats,
    scale: c_double,
    size: CSize,
    mean: CScalar,
    swap_rb: bool,
    _crop: bool,
) -> MatT {
    clear_error();
    let mut values = Vec::new();
    let mut shape = None;
    for i in 0..images.length.max(0) as usize {
        let img = unsafe { mat(*images.mats.add(i)) };
        match blob_planes(img, scale, size, mean, swap_rb) {
            Ok(p) => {
                shape = Some((p.c, p.h, p.w));
                values.extend(p.values);
            }
            Err(e) => {
                set_error(e);
                return std::ptr::null_mut();
            }
        }
    }
    let Some((c, h, w)) = shape else {
        set_error("no images");
        return std::ptr::null_mut();
    };
    FakeMat::from_f32(vec![images.length, c as i32, h as i32, w as i32], &values).into_raw()
}

unsafe extern "C" fn net_get_blob_channel(blob: MatT, imgidx: c_int, chnidx: c_int) -> MatT {
    clear_error();
    let blob = unsafe { mat(blob) };
    if blob.dims.len() != 4 {
        set_error("blob is not 4-dimensional");
        return std::ptr::null_mut();
    }
    if MatType(blob.typ).depth() != MatType::CV_32F {
        set_error("blob is not CV_32F");
        return std::ptr::null_mut();
    }
    let (n, c, h, w) = (blob.dims[0], blob.dims[1], blob.dims[2], blob.dims[3]);
    if imgidx < 0 || imgidx >= n || chnidx < 0 || chnidx >= c {
        set_error("index out of range");
        return std::ptr::null_mut();
    }
    let plane = (h * w) as usize;
    let start = ((imgidx * c + chnidx) as usize) * plane;
    let values = blob.f32_values();
    FakeMat::from_f32(vec![h, w], &values[start..start + plane]).into_raw()
}

unsafe extern "C" fn net_get_blob_size(blob: MatT) -> CScalar {
    clear_error();
    let blob = unsafe { mat(blob) };
    if blob.dims.len() != 4 {
        set_error("blob is not 4-dimensional");
        return CScalar {
            val1: 0.0,
            val2: 0.0,
            val3: 0.0,
            val4: 0.0,
        };
    }
    CScalar {
        val1: blob.dims[0] as f64,
        val2: blob.dims[1] as f64,
        val3: blob.dims[2] as f64,
        val4: blob.dims[3] as f64,
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn api() -> DnnApi {
    DnnApi {
        _lib: None,
        last_error,
        tick_frequency,
        cstrings_close,
        mats_close,
        mat_new_from_bytes,
        mat_close,
        mat_empty,
        mat_rows,
        mat_cols,
        mat_channels,
        mat_type,
        mat_total,
        mat_data_ptr,
        image_imread,
        net_read_net,
        net_read_net_bytes,
        net_read_net_from_caffe,
        net_read_net_from_tensorflow: net_read_net_single,
        net_read_net_from_onnx: net_read_net_single,
        net_read_net_from_torch: net_read_net_single,
        net_close,
        net_empty,
        net_set_input,
        net_forward,
        net_forward_layers,
        net_set_preferable_backend,
        net_set_preferable_target,
        net_get_layer_names,
        net_get_unconnected_out_layers_names,
        net_get_perf_profile,
        net_blob_from_image,
        net_blob_from_images,
        net_get_blob_channel,
        net_get_blob_size,
    }
}

/// Creates a matrix with arbitrary dimensions. `data` may be shorter than
/// the dimensions imply.
pub(crate) fn new_mat(dims: &[i32], typ: MatType, data: Vec<u8>) -> MatT {
    FakeMat::new(dims.to_vec(), typ.0, data).into_raw()
}

/// Installs the fake as the process-wide function table.
pub(crate) fn install() -> &'static DnnApi {
    runtime::install(api())
}

/// Writes a fake model file listing `layers`.
pub(crate) fn write_model(dir: &Path, name: &str, layers: &[&str]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, layers.join("\n")).unwrap();
    path
}

/// Writes a binary PPM image from RGB pixels.
pub(crate) fn write_ppm(dir: &Path, name: &str, width: u32, height: u32, rgb: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut content = format!("P6\n{width} {height}\n255\n").into_bytes();
    content.extend_from_slice(rgb);
    std::fs::write(&path, content).unwrap();
    path
}

pub(crate) fn net_close_calls(n: NetT) -> usize {
    unsafe { net(n) }.closes
}

pub(crate) fn mat_close_calls(m: MatT) -> usize {
    unsafe { mat(m) }.closes
}

pub(crate) fn net_backend_target(n: NetT) -> (i32, i32) {
    let n = unsafe { net(n) };
    (n.backend, n.target)
}

pub(crate) fn released_empty_nets() -> usize {
    EMPTY_NETS_RELEASED.load(Ordering::SeqCst)
}
