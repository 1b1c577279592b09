// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{Error, GeometryReason, Result},
    format::{PixelFormat, Rotation},
};
use std::fmt;
use turbojpeg::OwnedBuf;

/// One plane of a planar image, rows packed without padding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Plane {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Mutable rows of the plane, ready to hand to a raw-data read.
    pub fn rows_mut(&mut self) -> Vec<&mut [u8]> {
        let width = (self.width as usize).max(1);
        self.data.chunks_exact_mut(width).collect()
    }
}

/// Decoded pixel storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pixels {
    /// Interleaved rows of `width * bytes_per_pixel` bytes.
    Packed(Vec<u8>),
    /// Y, U and V planes.
    Planar([Plane; 3]),
}

/// An image decoded into host memory.
///
/// Both decode paths produce this type, so callers never need to know which
/// one ran. Packed images hold tightly packed rows; planar images hold three
/// [`Plane`]s whose chroma dimensions follow the JPEG's subsampling.
///
/// # Example
///
/// ```no_run
/// use edgefirst_hwjpeg::{DecodeRequest, JpegDecoder, PixelFormat};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let jpeg = std::fs::read("frame.jpg")?;
/// let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?;
/// let decoded = JpegDecoder::default().decode(&jpeg, &request)?;
/// if let Some(img) = decoded.image() {
///     println!("{} ({} bytes)", img, img.size());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Pixels,
}

impl DecodedImage {
    /// Zeroed packed image.
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: Pixels::Packed(vec![0; len]),
        }
    }

    /// Zeroed planar image with chroma decimated by `factors`.
    pub fn planar(width: u32, height: u32, factors: (u32, u32)) -> Self {
        let (hsf, vsf) = factors;
        Self::from_planes(
            width,
            height,
            [
                Plane::new(width, height),
                Plane::new(width.div_ceil(hsf), height.div_ceil(vsf)),
                Plane::new(width.div_ceil(hsf), height.div_ceil(vsf)),
            ],
        )
    }

    pub fn from_planes(width: u32, height: u32, planes: [Plane; 3]) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Planar,
            pixels: Pixels::Planar(planes),
        }
    }

    /// Wraps packed rows.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when `data` does not hold exactly `height`
    /// rows of `width` pixels.
    pub fn from_packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self> {
        if format.is_planar()
            || data.len() != width as usize * height as usize * format.bytes_per_pixel()
        {
            return Err(Error::InvalidState("packed data does not match its geometry"));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels: Pixels::Packed(data),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn into_pixels(self) -> Pixels {
        self.pixels
    }

    /// Packed rows, `None` for planar images.
    pub fn as_slice(&self) -> Option<&[u8]> {
        match &self.pixels {
            Pixels::Packed(data) => Some(data),
            Pixels::Planar(_) => None,
        }
    }

    pub fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.pixels {
            Pixels::Packed(data) => Some(data),
            Pixels::Planar(_) => None,
        }
    }

    pub fn planes(&self) -> Option<&[Plane; 3]> {
        match &self.pixels {
            Pixels::Packed(_) => None,
            Pixels::Planar(planes) => Some(planes),
        }
    }

    pub fn planes_mut(&mut self) -> Option<&mut [Plane; 3]> {
        match &mut self.pixels {
            Pixels::Packed(_) => None,
            Pixels::Planar(planes) => Some(planes),
        }
    }

    /// Total bytes of pixel data.
    pub fn size(&self) -> usize {
        match &self.pixels {
            Pixels::Packed(data) => data.len(),
            Pixels::Planar(planes) => planes.iter().map(|p| p.data.len()).sum(),
        }
    }

    /// Applies a rotation or flip, returning the transformed image.
    pub fn rotate(self, rotation: Rotation) -> Self {
        if rotation == Rotation::None {
            return self;
        }
        let (width, height) = if rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };
        let pixels = match self.pixels {
            Pixels::Packed(data) => Pixels::Packed(rotate_plane(
                &data,
                self.width,
                self.height,
                self.format.bytes_per_pixel(),
                rotation,
            )),
            Pixels::Planar(planes) => Pixels::Planar(planes.map(|plane| {
                let data = rotate_plane(&plane.data, plane.width, plane.height, 1, rotation);
                let (w, h) = if rotation.swaps_axes() {
                    (plane.height, plane.width)
                } else {
                    (plane.width, plane.height)
                };
                Plane {
                    width: w,
                    height: h,
                    data,
                }
            })),
        };
        Self {
            width,
            height,
            format: self.format,
            pixels,
        }
    }

    /// Keeps `width` columns starting at `x`.
    ///
    /// Chroma planes keep the columns covering the same luma window, starting
    /// at `x / hsf` where `hsf` is the plane's horizontal decimation.
    pub fn crop_columns(self, x: u32, width: u32) -> Result<Self> {
        if x == 0 && width == self.width {
            return Ok(self);
        }
        let fits = x.checked_add(width).is_some_and(|end| end <= self.width);
        if width == 0 || !fits {
            return Err(Error::GeometryRejected(GeometryReason::CropOutOfBounds));
        }
        let pixels = match self.pixels {
            Pixels::Packed(data) => Pixels::Packed(crop_plane(
                &data,
                self.width,
                self.height,
                self.format.bytes_per_pixel(),
                x,
                width,
            )),
            Pixels::Planar(planes) => {
                let luma_width = self.width;
                Pixels::Planar(planes.map(|plane| {
                    if plane.width == 0 {
                        return plane;
                    }
                    let hsf = luma_width.div_ceil(plane.width).max(1);
                    let cx = x / hsf;
                    let cw = width.div_ceil(hsf).min(plane.width - cx);
                    Plane {
                        width: cw,
                        height: plane.height,
                        data: crop_plane(&plane.data, plane.width, plane.height, 1, cx, cw),
                    }
                }))
            }
        };
        Ok(Self {
            width,
            height: self.height,
            format: self.format,
            pixels,
        })
    }
}

impl fmt::Display for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

fn rotate_plane(src: &[u8], width: u32, height: u32, bpp: usize, rotation: Rotation) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut dst = vec![0u8; src.len()];
    let out_w = if rotation.swaps_axes() { h } else { w };
    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::None => (x, y),
                Rotation::Right90 => (h - 1 - y, x),
                Rotation::Left90 => (y, w - 1 - x),
                Rotation::HorizontalFlip => (w - 1 - x, y),
                Rotation::VerticalFlip => (x, h - 1 - y),
                Rotation::Rotate180 => (w - 1 - x, h - 1 - y),
            };
            let s = (y * w + x) * bpp;
            let d = (dy * out_w + dx) * bpp;
            dst[d..d + bpp].copy_from_slice(&src[s..s + bpp]);
        }
    }
    dst
}

fn crop_plane(src: &[u8], width: u32, height: u32, bpp: usize, x: u32, cw: u32) -> Vec<u8> {
    let stride = width as usize * bpp;
    let start = x as usize * bpp;
    let len = cw as usize * bpp;
    src.chunks_exact(stride.max(1))
        .take(height as usize)
        .flat_map(|row| &row[start..start + len])
        .copied()
        .collect()
}

/// Packs 8-bit RGB rows into little-endian RGB565.
pub fn pack_rgb565(rgb: &[u8], dst: &mut [u8]) {
    for (px, out) in rgb.chunks_exact(3).zip(dst.chunks_exact_mut(2)) {
        let value =
            ((px[0] as u16 & 0xF8) << 8) | ((px[1] as u16 & 0xFC) << 3) | (px[2] as u16 >> 3);
        out.copy_from_slice(&value.to_le_bytes());
    }
}

/// Compresses packed RGB or RGBA rows to JPEG.
///
/// Used to produce fixtures and by the CLI to re-encode decoded output.
///
/// # Errors
///
/// Returns an error when the format is not RGB or RGBA or compression fails.
pub fn encode_jpeg(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
    quality: i32,
    subsampling: turbojpeg::Subsamp,
) -> Result<OwnedBuf> {
    let tj_format = match format {
        PixelFormat::Rgb => turbojpeg::PixelFormat::RGB,
        PixelFormat::Rgba => turbojpeg::PixelFormat::RGBA,
        other => return Err(Error::UnsupportedPixelFormat(other)),
    };
    let image = turbojpeg::Image {
        width: width as usize,
        height: height as usize,
        format: tj_format,
        pixels,
        pitch: width as usize * format.bytes_per_pixel(),
    };
    Ok(turbojpeg::compress(image, quality, subsampling)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> DecodedImage {
        let mut img = DecodedImage::packed(width, height, PixelFormat::Bgra);
        for (i, px) in img.as_slice_mut().unwrap().chunks_exact_mut(4).enumerate() {
            px.fill(i as u8);
        }
        img
    }

    fn first_lane(img: &DecodedImage) -> Vec<u8> {
        img.as_slice().unwrap().chunks_exact(4).map(|p| p[0]).collect()
    }

    #[test]
    fn rotations_move_pixels() {
        // 0 1 2
        // 3 4 5
        let img = numbered(3, 2);
        let right = img.clone().rotate(Rotation::Right90);
        assert_eq!((right.width(), right.height()), (2, 3));
        assert_eq!(first_lane(&right), [3, 0, 4, 1, 5, 2]);

        let left = img.clone().rotate(Rotation::Left90);
        assert_eq!(first_lane(&left), [2, 5, 1, 4, 0, 3]);

        let flipped = img.clone().rotate(Rotation::HorizontalFlip);
        assert_eq!(first_lane(&flipped), [2, 1, 0, 5, 4, 3]);
        let flipped = img.clone().rotate(Rotation::VerticalFlip);
        assert_eq!(first_lane(&flipped), [3, 4, 5, 0, 1, 2]);
        assert_eq!(first_lane(&img.rotate(Rotation::Rotate180)), [5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn crop_keeps_window() {
        let img = numbered(4, 2).crop_columns(1, 2).unwrap();
        assert_eq!(img.width(), 2);
        assert_eq!(first_lane(&img), [1, 2, 5, 6]);
        assert!(numbered(4, 2).crop_columns(3, 2).is_err());
        assert!(matches!(
            numbered(4, 2).crop_columns(u32::MAX, 2),
            Err(Error::GeometryRejected(GeometryReason::CropOutOfBounds))
        ));
    }

    #[test]
    fn planar_crop_halves_chroma() {
        let img = DecodedImage::planar(8, 2, (2, 2)).crop_columns(2, 4).unwrap();
        let planes = img.planes().unwrap();
        assert_eq!((planes[0].width, planes[1].width), (4, 2));
        assert_eq!(planes[1].height, 1);
    }

    #[test]
    fn rgb565_packs_red_high() {
        let mut out = [0u8; 4];
        pack_rgb565(&[0xFF, 0, 0, 0, 0, 0xFF], &mut out);
        assert_eq!(u16::from_le_bytes([out[0], out[1]]), 0xF800);
        assert_eq!(u16::from_le_bytes([out[2], out[3]]), 0x001F);
    }

    #[test]
    fn packed_geometry_is_checked() {
        assert!(DecodedImage::from_packed(2, 2, PixelFormat::Rgb, vec![0; 11]).is_err());
        let img = DecodedImage::from_packed(2, 2, PixelFormat::Rgb, vec![0; 12]).unwrap();
        assert_eq!(img.size(), 12);
        assert_eq!(img.to_string(), "2x2 RGB");
    }
}
