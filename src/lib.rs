// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst Hardware JPEG Decode
//!
//! This library offloads JPEG decoding to the Nuvoton VC8000 decoder found on
//! the MA35D1, driving it as a V4L2 memory-to-memory device, and falls back to
//! libjpeg-turbo whenever the hardware cannot serve a request. A malformed or
//! oversized image never takes the pipeline down; it is simply decoded in
//! software.
//!
//! ## Features
//!
//! - **Hardware Offload**: Bitstream in on the OUTPUT queue, pixels out on the
//!   CAPTURE queue, with the decoder's post-processor handling scaling,
//!   rotation, flips and color conversion.
//! - **Direct Output**: Decode straight into a frame buffer or physical
//!   surface with placement and rotation.
//! - **Format Remapping**: Fast conversion of the native BGRA, RGB565, NV12
//!   and YUYV captures into RGB, BGR, RGBA, BGRA, ARGB, ABGR, RGB565 or planar
//!   YUV.
//! - **Software Fallback**: libjpeg-turbo with SIMD reproduces the hardware
//!   geometry so callers see the same output either way.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_hwjpeg::{DecodeRequest, HardwareDecoder, PixelFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let jpeg = std::fs::read("frame.jpg")?;
//! let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?;
//!
//! // One decoder per process; sessions serialize on its lock.
//! let decoder = HardwareDecoder::default();
//! let mut session = decoder.session()?;
//! let geometry = session.prepare(&request)?;
//! session.submit(&jpeg)?;
//!
//! let row_len = geometry.output_width as usize * 3;
//! let mut row = vec![0u8; row_len];
//! while session.read_scanlines(&mut [&mut row[..]])? == 1 {
//!     // consume row
//! }
//! session.release();
//! # Ok(())
//! # }
//! ```
//!
//! For the common case [`JpegDecoder::decode`] wraps the whole sequence and
//! handles the fallback.
//!
//! ## Platform Requirements
//!
//! - **Linux**: V4L2 multi-planar M2M support
//! - **Hardware Acceleration**: Nuvoton MA35D1 with the VC8000 driver
//!   (software fallback available on other platforms)
//!
//! ## Safety
//!
//! This library uses `unsafe` code for the V4L2 ioctls and for the memory
//! mappings of device buffers. All unsafe operations are isolated to the
//! `device` and `v4l2` modules and wrapped with safe APIs.

pub mod buffers;
pub mod config;
pub mod decoder;
pub mod device;
pub mod error;
pub mod fallback;
pub mod format;
pub mod geometry;
pub mod image;
pub mod remap;
pub mod session;
pub mod software;
pub mod v4l2;

pub use config::DecoderConfig;
pub use decoder::{DecodeResult, DecodeSession, DecodeState};
pub use device::M2mDevice;
pub use error::{Error, GeometryReason, Result};
pub use fallback::{DecodePath, Decoded, JpegDecoder, Output};
pub use format::{NativeFormat, PixelFormat, Rotation, Scale, Subsampling};
pub use geometry::{Crop, DecodeRequest, FrameBufferDestination, Geometry, SurfaceTarget};
pub use image::{DecodedImage, Pixels, Plane};
pub use session::{DeviceSession, HardwareDecoder};
