// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel formats, chroma layouts and post-processing transforms shared by the
//! hardware and software decode paths.

use core::fmt;
use vc8000_sys::{
    PP_ROTATION_180, PP_ROTATION_HOR_FLIP, PP_ROTATION_LEFT_90, PP_ROTATION_NONE,
    PP_ROTATION_RIGHT_90, PP_ROTATION_VER_FLIP, V4L2_PIX_FMT_ABGR32, V4L2_PIX_FMT_NV12,
    V4L2_PIX_FMT_RGB565, V4L2_PIX_FMT_YUYV,
};

/// Output layout requested by the caller.
///
/// Packed formats are named by memory byte order, so `Rgb` is three bytes
/// R, G, B per pixel and `Bgra` is four bytes B, G, R, A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Argb,
    Abgr,
    /// 16-bit little-endian 5-6-5, red in the high bits.
    Rgb565,
    /// Separate Y, U and V planes at the image's own chroma subsampling.
    Planar,
}

impl PixelFormat {
    /// Bytes per pixel of a packed row. Planar output has one byte per sample.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Argb | PixelFormat::Abgr => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Planar => 1,
        }
    }

    pub const fn is_planar(self) -> bool {
        matches!(self, PixelFormat::Planar)
    }

    /// Native capture layout the hardware should produce for this request.
    ///
    /// Every packed RGB-family order is served from the one 32-bit BGRA
    /// layout. Planar requests depend on the image's chroma layout; anything
    /// other than 4:2:0 or 4:2:2 is not attempted in hardware.
    pub fn native(self, subsampling: Subsampling) -> Option<NativeFormat> {
        match self {
            PixelFormat::Rgb
            | PixelFormat::Bgr
            | PixelFormat::Rgba
            | PixelFormat::Bgra
            | PixelFormat::Argb
            | PixelFormat::Abgr => Some(NativeFormat::Bgra32),
            PixelFormat::Rgb565 => Some(NativeFormat::Rgb565),
            PixelFormat::Planar => match subsampling {
                Subsampling::Yuv420 => Some(NativeFormat::Nv12),
                Subsampling::Yuv422 => Some(NativeFormat::Yuyv),
                _ => None,
            },
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgr => "BGR",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Argb => "ARGB",
            PixelFormat::Abgr => "ABGR",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Planar => "YUV planar",
        };
        f.write_str(name)
    }
}

/// Layout the VC8000 post-processor writes into CAPTURE buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFormat {
    /// `V4L2_PIX_FMT_ABGR32`, bytes B, G, R, A.
    Bgra32,
    Rgb565,
    /// Y plane followed by interleaved U/V at half resolution in both axes.
    Nv12,
    /// Packed 4:2:2, bytes Y0, U, Y1, V.
    Yuyv,
}

impl NativeFormat {
    pub const fn fourcc(self) -> u32 {
        match self {
            NativeFormat::Bgra32 => V4L2_PIX_FMT_ABGR32,
            NativeFormat::Rgb565 => V4L2_PIX_FMT_RGB565,
            NativeFormat::Nv12 => V4L2_PIX_FMT_NV12,
            NativeFormat::Yuyv => V4L2_PIX_FMT_YUYV,
        }
    }

    /// Bytes per pixel of the first plane.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            NativeFormat::Bgra32 => 4,
            NativeFormat::Rgb565 | NativeFormat::Yuyv => 2,
            NativeFormat::Nv12 => 1,
        }
    }

    /// Size of a full frame, for formats the kernel cannot size by itself.
    pub const fn frame_size(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            NativeFormat::Nv12 => pixels + pixels / 2,
            _ => pixels * self.bytes_per_pixel(),
        }
    }

    /// The kernel's format table has no entry for RGB565 on this driver, so
    /// the capture `sizeimage` has to be filled in by hand.
    pub const fn needs_manual_size(self) -> bool {
        matches!(self, NativeFormat::Rgb565)
    }
}

impl fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.fourcc().to_le_bytes();
        write!(f, "{}", String::from_utf8_lossy(&bytes))
    }
}

/// Chroma subsampling of the source JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsampling {
    Yuv444,
    Yuv422,
    Yuv420,
    Yuv440,
    Yuv411,
    Gray,
    Unknown,
}

impl Subsampling {
    /// Horizontal and vertical chroma decimation factors.
    pub const fn factors(self) -> (u32, u32) {
        match self {
            Subsampling::Yuv422 => (2, 1),
            Subsampling::Yuv420 => (2, 2),
            Subsampling::Yuv440 => (1, 2),
            Subsampling::Yuv411 => (4, 1),
            _ => (1, 1),
        }
    }
}

impl From<turbojpeg::Subsamp> for Subsampling {
    fn from(value: turbojpeg::Subsamp) -> Self {
        match value {
            turbojpeg::Subsamp::None => Subsampling::Yuv444,
            turbojpeg::Subsamp::Sub2x1 => Subsampling::Yuv422,
            turbojpeg::Subsamp::Sub2x2 => Subsampling::Yuv420,
            turbojpeg::Subsamp::Sub1x2 => Subsampling::Yuv440,
            turbojpeg::Subsamp::Sub4x1 => Subsampling::Yuv411,
            turbojpeg::Subsamp::Gray => Subsampling::Gray,
            #[allow(unreachable_patterns)]
            _ => Subsampling::Unknown,
        }
    }
}

/// Rotation and flip operations of the post-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    /// 90 degrees clockwise.
    Right90,
    /// 90 degrees counter-clockwise.
    Left90,
    HorizontalFlip,
    VerticalFlip,
    Rotate180,
}

impl Rotation {
    pub const fn pp_op(self) -> i32 {
        match self {
            Rotation::None => PP_ROTATION_NONE,
            Rotation::Right90 => PP_ROTATION_RIGHT_90,
            Rotation::Left90 => PP_ROTATION_LEFT_90,
            Rotation::HorizontalFlip => PP_ROTATION_HOR_FLIP,
            Rotation::VerticalFlip => PP_ROTATION_VER_FLIP,
            Rotation::Rotate180 => PP_ROTATION_180,
        }
    }

    /// True when the operation exchanges width and height.
    pub const fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Right90 | Rotation::Left90)
    }

    /// Where the real image starts inside the rotated MCU-aligned frame.
    ///
    /// `pad_width` and `pad_height` are the padding columns and rows the
    /// source carries at its right and bottom edges before the operation.
    /// Returns the `(x, y)` offset of the first real pixel in the output.
    pub const fn padding_origin(self, pad_width: u32, pad_height: u32) -> (u32, u32) {
        match self {
            Rotation::None => (0, 0),
            Rotation::HorizontalFlip => (pad_width, 0),
            Rotation::VerticalFlip => (0, pad_height),
            Rotation::Rotate180 => (pad_width, pad_height),
            // Bottom padding rows become the leftmost columns.
            Rotation::Right90 => (pad_height, 0),
            // Right padding columns become the top rows.
            Rotation::Left90 => (0, pad_width),
        }
    }
}

/// Scale ratio applied to the decoded image, `num / denom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub num: u32,
    pub denom: u32,
}

impl Scale {
    pub const ONE: Scale = Scale { num: 1, denom: 1 };

    pub const fn new(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }

    /// A ratio the decoder can act on: neither side may be zero.
    pub const fn is_valid(self) -> bool {
        self.num != 0 && self.denom != 0
    }

    /// Scaled dimension, rounded up the way libjpeg does. Saturates rather
    /// than wrapping, and yields 0 for an invalid ratio.
    pub const fn apply(self, dimension: u32) -> u32 {
        if !self.is_valid() {
            return 0;
        }
        let scaled = (dimension as u64 * self.num as u64).div_ceil(self.denom as u64);
        if scaled > u32::MAX as u64 {
            u32::MAX
        } else {
            scaled as u32
        }
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::ONE
    }
}

impl From<Scale> for turbojpeg::ScalingFactor {
    fn from(value: Scale) -> Self {
        turbojpeg::ScalingFactor::new(value.num as usize, value.denom as usize)
    }
}
