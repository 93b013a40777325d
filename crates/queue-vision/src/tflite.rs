use anyhow::{Context, Result};
use image::{imageops::FilterType, RgbImage};
use std::{ffi::CString, os::raw::{c_char, c_int, c_void}, ptr};
use tracing::info;

use crate::config::{Device, DetectorConfig, OutputLayout};
use crate::{Detector, RawDetection, RawDetections};

#[repr(C)]
struct TfLiteModel;
#[repr(C)]
struct TfLiteInterpreterOptions;
#[repr(C)]
struct TfLiteInterpreter;
#[repr(C)]
struct TfLiteTensor;
#[repr(C)]
struct TfLiteDelegate;

#[link(name = "tensorflowlite_c")]
extern "C" {
    fn TfLiteModelCreateFromFile(model_path: *const c_char) -> *mut TfLiteModel;
    fn TfLiteModelDelete(model: *mut TfLiteModel);

    fn TfLiteInterpreterOptionsCreate() -> *mut TfLiteInterpreterOptions;
    fn TfLiteInterpreterOptionsDelete(options: *mut TfLiteInterpreterOptions);
    fn TfLiteInterpreterOptionsSetNumThreads(options: *mut TfLiteInterpreterOptions, num_threads: c_int);
    #[allow(dead_code)]
    fn TfLiteInterpreterOptionsAddDelegate(options: *mut TfLiteInterpreterOptions, delegate: *mut TfLiteDelegate);

    fn TfLiteInterpreterCreate(model: *const TfLiteModel, options: *const TfLiteInterpreterOptions) -> *mut TfLiteInterpreter;
    fn TfLiteInterpreterDelete(interpreter: *mut TfLiteInterpreter);

    fn TfLiteInterpreterAllocateTensors(interpreter: *mut TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterInvoke(interpreter: *mut TfLiteInterpreter) -> c_int;

    fn TfLiteInterpreterGetOutputTensorCount(interpreter: *const TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterGetInputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *mut TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *const TfLiteTensor;

    fn TfLiteTensorData(tensor: *const TfLiteTensor) -> *mut c_void;
    fn TfLiteTensorByteSize(tensor: *const TfLiteTensor) -> usize;

    fn TfLiteTensorNumDims(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorDim(tensor: *const TfLiteTensor, dim_index: c_int) -> c_int;
}

#[cfg(feature = "vision-coral")]
#[link(name = "edgetpu")]
extern "C" {
    fn edgetpu_create_delegate(device_type: c_int, device_path: *const c_char, options: *const c_char) -> *mut TfLiteDelegate;
    fn edgetpu_free_delegate(delegate: *mut TfLiteDelegate);
}

pub struct TfliteDetector {
    cfg: DetectorConfig,
    model: *mut TfLiteModel,
    opts: *mut TfLiteInterpreterOptions,
    interp: *mut TfLiteInterpreter,
    input_w: u32,
    input_h: u32,
    #[cfg(feature = "vision-coral")]
    delegate: Option<*mut TfLiteDelegate>,
}

// The interpreter is only ever driven from the pipeline's single control flow.
unsafe impl Send for TfliteDetector {}

impl TfliteDetector {
    pub fn new(cfg: DetectorConfig) -> Result<Self> {
        anyhow::ensure!(
            std::path::Path::new(&cfg.model_path).is_file(),
            "model file not found: {} (check --model)",
            cfg.model_path
        );
        let cpath = CString::new(cfg.model_path.as_str())?;
        let model = unsafe { TfLiteModelCreateFromFile(cpath.as_ptr()) };
        anyhow::ensure!(!model.is_null(), "failed to load tflite model: {}", cfg.model_path);

        let opts = unsafe { TfLiteInterpreterOptionsCreate() };
        anyhow::ensure!(!opts.is_null(), "failed to create tflite options");
        unsafe { TfLiteInterpreterOptionsSetNumThreads(opts, cfg.num_threads.max(1)); }

        #[cfg(feature = "vision-coral")]
        let delegate = if cfg.device == Device::EdgeTpu {
            let d = unsafe { edgetpu_create_delegate(0, ptr::null(), ptr::null()) };
            anyhow::ensure!(!d.is_null(), "failed to create EdgeTPU delegate");
            unsafe { TfLiteInterpreterOptionsAddDelegate(opts, d); }
            Some(d)
        } else { None };

        #[cfg(not(feature = "vision-coral"))]
        if cfg.device == Device::EdgeTpu {
            anyhow::bail!("device EDGETPU requested but binary not built with --features vision-coral");
        }

        let interp = unsafe { TfLiteInterpreterCreate(model, opts) };
        anyhow::ensure!(!interp.is_null(), "failed to create tflite interpreter");

        let rc = unsafe { TfLiteInterpreterAllocateTensors(interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterAllocateTensors failed");

        let input = unsafe { TfLiteInterpreterGetInputTensor(interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let (input_w, input_h) = match tensor_dims(input).as_slice() {
            [1, h, w, 3] => (*w as u32, *h as u32),
            other => anyhow::bail!("unsupported input dims {:?}; expected [1, H, W, 3]", other),
        };

        info!("detector: loaded TFLite model {} (input {}x{}, device {:?})", cfg.model_path, input_w, input_h, cfg.device);

        Ok(Self {
            cfg, model, opts, interp, input_w, input_h,
            #[cfg(feature = "vision-coral")]
            delegate,
        })
    }

    pub fn inspect(&mut self) -> Result<String> {
        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let mut s = format!(
            "TFLite inspect:\n- input[0] dims={:?} bytes={}\n",
            tensor_dims(input),
            unsafe { TfLiteTensorByteSize(input) }
        );
        let n = unsafe { TfLiteInterpreterGetOutputTensorCount(self.interp) };
        for i in 0..n {
            let out = self.output(i as usize)?;
            s.push_str(&format!(
                "- output[{}] dims={:?} bytes={}\n",
                i,
                tensor_dims(out),
                unsafe { TfLiteTensorByteSize(out) }
            ));
        }
        Ok(s)
    }

    fn output(&self, idx: usize) -> Result<*const TfLiteTensor> {
        let t = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, idx as c_int) };
        anyhow::ensure!(!t.is_null(), "no output tensor {}", idx);
        Ok(t)
    }

    fn output_f32(&self, idx: usize) -> Result<&[f32]> {
        let t = self.output(idx)?;
        let p = unsafe { TfLiteTensorData(t) as *const f32 };
        anyhow::ensure!(!p.is_null(), "null output tensor {} data", idx);
        let len = unsafe { TfLiteTensorByteSize(t) } / std::mem::size_of::<f32>();
        Ok(unsafe { std::slice::from_raw_parts(p, len) })
    }

    fn decode_ssd(&self) -> Result<Vec<RawDetection>> {
        let dims = tensor_dims(self.output(0)?);
        anyhow::ensure!(
            dims.last() == Some(&7),
            "output dims {:?} are not [1, 1, N, 7]; try --output-layout tflite-postprocess",
            dims
        );
        Ok(decode_ssd_rows(self.output_f32(0)?))
    }

    fn decode_postprocess(&self) -> Result<Vec<RawDetection>> {
        let boxes = self.output_f32(0)?;
        let classes = self.output_f32(1)?;
        let scores = self.output_f32(2)?;
        let count = self.output_f32(3)?.first().copied().unwrap_or(0.0) as usize;
        Ok(decode_postprocess_rows(boxes, classes, scores, count))
    }
}

impl Detector for TfliteDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<RawDetections> {
        let resized = image::imageops::resize(frame, self.input_w, self.input_h, FilterType::Triangle);

        // assumes u8 RGB input (quant/edgetpu-friendly)
        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");

        let in_bytes = unsafe { TfLiteTensorByteSize(input) };
        let in_ptr = unsafe { TfLiteTensorData(input) as *mut u8 };
        anyhow::ensure!(!in_ptr.is_null(), "null input tensor data");

        let need = (self.input_w * self.input_h * 3) as usize;
        anyhow::ensure!(in_bytes == need, "input tensor is not u8 RGB: {} bytes, expected {}", in_bytes, need);
        unsafe { ptr::copy_nonoverlapping(resized.as_raw().as_ptr(), in_ptr, need); }

        let rc = unsafe { TfLiteInterpreterInvoke(self.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterInvoke failed");

        let rows = match self.cfg.output_layout {
            OutputLayout::Ssd => self.decode_ssd(),
            OutputLayout::TflitePostprocess => self.decode_postprocess(),
        }
        .context("decode detector output")?;
        Ok(RawDetections::single(rows))
    }
}

fn tensor_dims(t: *const TfLiteTensor) -> Vec<i32> {
    unsafe {
        let nd = TfLiteTensorNumDims(t);
        let mut v = Vec::with_capacity(nd as usize);
        for i in 0..nd { v.push(TfLiteTensorDim(t, i)); }
        v
    }
}

/// Rows of 7 floats; a negative image id marks the end of valid rows.
fn decode_ssd_rows(raw: &[f32]) -> Vec<RawDetection> {
    raw.chunks_exact(7)
        .take_while(|r| r[0] >= 0.0)
        .map(|r| RawDetection {
            image_id: r[0] as i32,
            class_id: r[1] as i32,
            confidence: r[2],
            xmin: r[3], ymin: r[4], xmax: r[5], ymax: r[6],
        })
        .collect()
}

fn decode_postprocess_rows(boxes: &[f32], classes: &[f32], scores: &[f32], count: usize) -> Vec<RawDetection> {
    let n = count.min(classes.len()).min(scores.len()).min(boxes.len() / 4);
    (0..n)
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            RawDetection {
                image_id: 0,
                class_id: classes[i] as i32,
                confidence: scores[i],
                xmin: b[1], ymin: b[0], xmax: b[3], ymax: b[2],
            }
        })
        .collect()
}

impl Drop for TfliteDetector {
    fn drop(&mut self) {
        unsafe {
            if !self.interp.is_null() { TfLiteInterpreterDelete(self.interp); }
            if !self.opts.is_null() { TfLiteInterpreterOptionsDelete(self.opts); }
            if !self.model.is_null() { TfLiteModelDelete(self.model); }
        }
        #[cfg(feature = "vision-coral")]
        unsafe {
            if let Some(d) = self.delegate {
                edgetpu_free_delegate(d);
            }
        }
    }
}
