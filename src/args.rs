// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_hwjpeg::{Crop, DecodeRequest, DecoderConfig, PixelFormat, Rotation, Scale};
use std::{path::PathBuf, time::Duration};

/// Output pixel layout.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum FormatSetting {
    /// Packed 24-bit R, G, B
    Rgb,
    /// Packed 24-bit B, G, R
    Bgr,
    /// Packed 32-bit R, G, B, A
    Rgba,
    /// Packed 32-bit B, G, R, A
    Bgra,
    /// Packed 32-bit A, R, G, B
    Argb,
    /// Packed 32-bit A, B, G, R
    Abgr,
    /// 16-bit 5-6-5
    Rgb565,
    /// Y, U and V planes written back to back
    Planar,
}

impl From<FormatSetting> for PixelFormat {
    fn from(value: FormatSetting) -> Self {
        match value {
            FormatSetting::Rgb => PixelFormat::Rgb,
            FormatSetting::Bgr => PixelFormat::Bgr,
            FormatSetting::Rgba => PixelFormat::Rgba,
            FormatSetting::Bgra => PixelFormat::Bgra,
            FormatSetting::Argb => PixelFormat::Argb,
            FormatSetting::Abgr => PixelFormat::Abgr,
            FormatSetting::Rgb565 => PixelFormat::Rgb565,
            FormatSetting::Planar => PixelFormat::Planar,
        }
    }
}

/// Rotation or flip applied by the post-processor.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum RotationSetting {
    /// No rotation
    None,
    /// 90 degrees clockwise
    Right,
    /// 90 degrees counter-clockwise
    Left,
    /// 180 degrees
    Half,
    /// Flip horizontally (left-right)
    Horizontal,
    /// Flip vertically (top-bottom)
    Vertical,
}

impl From<RotationSetting> for Rotation {
    fn from(value: RotationSetting) -> Self {
        match value {
            RotationSetting::None => Rotation::None,
            RotationSetting::Right => Rotation::Right90,
            RotationSetting::Left => Rotation::Left90,
            RotationSetting::Half => Rotation::Rotate180,
            RotationSetting::Horizontal => Rotation::HorizontalFlip,
            RotationSetting::Vertical => Rotation::VerticalFlip,
        }
    }
}

/// Command-line arguments for the hardware JPEG decode tool.
///
/// Decodes one JPEG file through the VC8000 (or libjpeg-turbo when the
/// hardware declines) and writes the raw pixels to a file.
///
/// # Example
///
/// ```bash
/// # Half scale BGRA, rotated clockwise
/// hwjpeg-decode frame.jpg frame.bgra --format bgra --scale "1 2" --rotation right
///
/// # Force software decode via the environment
/// export HWJPEG_SOFTWARE=true
/// hwjpeg-decode frame.jpg frame.rgb
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JPEG file to decode
    pub input: PathBuf,

    /// Raw pixel output file
    pub output: PathBuf,

    /// Output pixel format
    #[arg(short, long, env = "HWJPEG_FORMAT", default_value = "rgb", value_enum)]
    pub format: FormatSetting,

    /// Scale ratio (numerator denominator)
    #[arg(
        short,
        long,
        env = "HWJPEG_SCALE",
        default_value = "1 1",
        value_delimiter = ' ',
        num_args = 2,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub scale: Vec<u32>,

    /// Rotation or flip
    #[arg(short, long, env = "HWJPEG_ROTATION", default_value = "none", value_enum)]
    pub rotation: RotationSetting,

    /// Horizontal crop of the output (x width)
    #[arg(long, value_delimiter = ' ', num_args = 2)]
    pub crop: Option<Vec<u32>>,

    /// Skip the hardware and decode with libjpeg-turbo
    #[arg(long, env = "HWJPEG_SOFTWARE")]
    pub software: bool,

    /// Decoder device nodes to probe, in order
    #[arg(
        long,
        env = "HWJPEG_DEVICES",
        default_value = "/dev/video0 /dev/video1 /dev/video2 /dev/video3",
        value_delimiter = ' '
    )]
    pub devices: Vec<PathBuf>,

    /// Give up on the hardware after this many milliseconds (0 waits forever)
    #[arg(long, env = "HWJPEG_POLL_TIMEOUT", default_value = "0")]
    pub poll_timeout: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    /// Builds the decode request for `jpeg` from the parsed options.
    pub fn request(&self, jpeg: &[u8]) -> edgefirst_hwjpeg::Result<DecodeRequest> {
        let mut request = DecodeRequest::from_jpeg(jpeg, self.format.into())?
            .with_scale(Scale::new(self.scale[0], self.scale[1]))
            .with_rotation(self.rotation.into());
        if let Some(crop) = &self.crop {
            request = request.with_crop(Crop {
                x: crop[0],
                width: crop[1],
            });
        }
        Ok(request)
    }
}

impl From<&Args> for DecoderConfig {
    fn from(args: &Args) -> Self {
        let timeout = match args.poll_timeout {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        DecoderConfig::default()
            .with_devices(args.devices.iter().cloned())
            .with_hardware(!args.software)
            .with_poll_timeout(timeout)
    }
}
