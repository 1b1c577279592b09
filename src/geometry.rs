// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Output geometry validation against the VC8000 post-processor limits.
//!
//! Everything here is pure arithmetic so a request can be rejected before a
//! single ioctl is issued.

use crate::{
    config::DecoderConfig,
    error::{Error, GeometryReason, Result},
    format::{NativeFormat, PixelFormat, Rotation, Scale, Subsampling},
};

/// Macroblock granularity of the decoder.
pub const MCU_SIZE: u32 = 16;

/// Placeholder capture size used when output goes straight to a surface.
pub const DIRECT_CAPTURE_SIZE: u32 = 32;

/// Rounds up to the MCU grid, or `None` when that leaves the u32 range.
pub const fn align_mcu(dimension: u32) -> Option<u32> {
    dimension.checked_next_multiple_of(MCU_SIZE)
}

pub const fn max_upscaled_width(source: u32) -> u32 {
    3 * source
}

pub const fn max_upscaled_height(source: u32) -> u32 {
    (3 * source).saturating_sub(2)
}

/// Where decoded pixels end up when output bypasses the CAPTURE buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTarget {
    /// Numbered frame buffer known to the driver (`/dev/fbN`).
    FrameBuffer(u32),
    /// Physically contiguous surface.
    Physical { address: u32, size: u32 },
}

/// Caller supplied display surface for direct output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBufferDestination {
    pub target: SurfaceTarget,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Size of the decoded image on the surface.
    pub image_width: u32,
    pub image_height: u32,
    pub x: u32,
    pub y: u32,
    pub rotation: Rotation,
}

/// Horizontal window of the output to read back, as with a cropped
/// scanline decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub width: u32,
}

/// Everything the controller needs to know about one decode.
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub source_width: u32,
    pub source_height: u32,
    pub subsampling: Subsampling,
    pub format: PixelFormat,
    pub scale: Scale,
    /// Ignored in direct mode, where the destination carries its own.
    pub rotation: Rotation,
    pub crop: Option<Crop>,
    pub destination: Option<FrameBufferDestination>,
}

impl DecodeRequest {
    pub fn new(source_width: u32, source_height: u32, format: PixelFormat) -> Self {
        Self {
            source_width,
            source_height,
            subsampling: Subsampling::Yuv420,
            format,
            scale: Scale::ONE,
            rotation: Rotation::None,
            crop: None,
            destination: None,
        }
    }

    /// Builds a request from the JPEG header, picking up the real dimensions
    /// and chroma layout.
    pub fn from_jpeg(jpeg: &[u8], format: PixelFormat) -> Result<Self> {
        let header = turbojpeg::read_header(jpeg)?;
        let mut request = Self::new(header.width as u32, header.height as u32, format);
        request.subsampling = header.subsamp.into();
        Ok(request)
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_subsampling(mut self, subsampling: Subsampling) -> Self {
        self.subsampling = subsampling;
        self
    }

    pub fn with_destination(mut self, destination: FrameBufferDestination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn rotation(&self) -> Rotation {
        match &self.destination {
            Some(dest) => dest.rotation,
            None => self.rotation,
        }
    }

    /// Size of the image the caller reads back, before cropping.
    pub fn output_size(&self) -> (u32, u32) {
        let width = self.scale.apply(self.source_width);
        let height = self.scale.apply(self.source_height);
        if self.rotation().swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

/// Result of validating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Source dimensions rounded up to the MCU grid.
    pub aligned_width: u32,
    pub aligned_height: u32,
    /// Size the post-processor is asked to produce.
    pub target_width: u32,
    pub target_height: u32,
    /// Size of the window handed back to the caller.
    pub output_width: u32,
    pub output_height: u32,
    /// First output column handed back to the caller.
    pub column_offset: u32,
    /// Offset of the real image inside the CAPTURE frame once the MCU
    /// padding has been moved by the rotation. Zero in direct mode.
    pub origin_x: u32,
    pub origin_y: u32,
    pub native: NativeFormat,
    pub rotation: Rotation,
    pub direct: bool,
}

impl Geometry {
    /// Checks a request against the hardware limits.
    pub fn validate(request: &DecodeRequest, config: &DecoderConfig) -> Result<Self> {
        if !request.scale.is_valid() {
            return Err(Error::GeometryRejected(GeometryReason::InvalidScale));
        }
        let native = request
            .format
            .native(request.subsampling)
            .ok_or(if request.format.is_planar() {
                Error::GeometryRejected(GeometryReason::UnsupportedSubsampling)
            } else {
                Error::UnsupportedPixelFormat(request.format)
            })?;

        // Sources whose pixel count or MCU grid leaves u32 never reach the device.
        let (Some(mut aligned_width), Some(mut aligned_height), Some(_)) = (
            align_mcu(request.source_width),
            align_mcu(request.source_height),
            request.source_width.checked_mul(request.source_height),
        ) else {
            return Err(Error::GeometryRejected(GeometryReason::TooLarge));
        };
        let rotation = request.rotation();
        let direct = request.destination.is_some();

        let (origin_x, origin_y) = if direct {
            (0, 0)
        } else {
            let pad_width = request
                .scale
                .apply(aligned_width)
                .saturating_sub(request.scale.apply(request.source_width));
            let pad_height = request
                .scale
                .apply(aligned_height)
                .saturating_sub(request.scale.apply(request.source_height));
            rotation.padding_origin(pad_width, pad_height)
        };

        let (target_width, target_height) = match &request.destination {
            Some(dest) => (dest.image_width, dest.image_height),
            None => {
                let width = request.scale.apply(aligned_width);
                let height = request.scale.apply(aligned_height);
                if width < config.min_output && height < config.min_output {
                    return Err(Error::GeometryRejected(GeometryReason::TooSmall));
                }
                if rotation.swaps_axes() {
                    (height, width)
                } else {
                    (width, height)
                }
            }
        };

        if rotation.swaps_axes() {
            std::mem::swap(&mut aligned_width, &mut aligned_height);
        }

        // The post-processor scales both axes in the same direction.
        if (aligned_width > target_width && aligned_height < target_height)
            || (aligned_width < target_width && aligned_height > target_height)
        {
            return Err(Error::GeometryRejected(GeometryReason::InconsistentScale));
        }

        if target_width > config.max_output_width || target_height > config.max_output_height {
            return Err(Error::GeometryRejected(GeometryReason::TooLarge));
        }

        if target_width > max_upscaled_width(aligned_width)
            || target_height > max_upscaled_height(aligned_height)
        {
            return Err(Error::GeometryRejected(GeometryReason::UpscaleLimit));
        }

        let (full_width, output_height) = request.output_size();
        let (column_offset, output_width) = match request.crop {
            Some(crop) => (crop.x, crop.width),
            None => (0, full_width),
        };
        let fits = column_offset
            .checked_add(output_width)
            .is_some_and(|end| end <= full_width);
        if !direct && (!fits || output_width == 0) {
            return Err(Error::GeometryRejected(GeometryReason::CropOutOfBounds));
        }

        Ok(Self {
            aligned_width,
            aligned_height,
            target_width,
            target_height,
            output_width,
            output_height,
            column_offset,
            origin_x,
            origin_y,
            native,
            rotation,
            direct,
        })
    }

    /// CAPTURE surface to negotiate with the driver.
    pub fn capture_size(&self) -> (u32, u32) {
        if self.direct {
            (DIRECT_CAPTURE_SIZE, DIRECT_CAPTURE_SIZE)
        } else {
            (self.target_width, self.target_height)
        }
    }
}
