// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! libjpeg-turbo decode path.
//!
//! Produces the same geometry the hardware would for a given request: the
//! image is decoded at the requested scale, then rotated or flipped and
//! finally cropped to the requested column window.

use crate::{
    error::{Error, GeometryReason, Result},
    format::{PixelFormat, Subsampling},
    geometry::DecodeRequest,
    image::{pack_rgb565, DecodedImage, Plane},
};
use tracing::{instrument, trace};
use turbojpeg::{Decompressor, Image, YuvImage};

fn tj_format(format: PixelFormat) -> Option<turbojpeg::PixelFormat> {
    Some(match format {
        PixelFormat::Rgb => turbojpeg::PixelFormat::RGB,
        PixelFormat::Bgr => turbojpeg::PixelFormat::BGR,
        PixelFormat::Rgba => turbojpeg::PixelFormat::RGBA,
        PixelFormat::Bgra => turbojpeg::PixelFormat::BGRA,
        PixelFormat::Argb => turbojpeg::PixelFormat::ARGB,
        PixelFormat::Abgr => turbojpeg::PixelFormat::ABGR,
        PixelFormat::Rgb565 | PixelFormat::Planar => return None,
    })
}

/// Decodes `jpeg` as described by `request`.
///
/// In direct mode the destination's rotation applies and the image is
/// returned to the caller instead of being written to the surface.
///
/// # Errors
///
/// [`Error::Software`] when libjpeg-turbo rejects the stream or the scale,
/// and [`Error::GeometryRejected`] for a zero scale or a crop window outside
/// the image.
#[instrument(skip_all, fields(format = %request.format))]
pub fn decode(jpeg: &[u8], request: &DecodeRequest) -> Result<DecodedImage> {
    if !request.scale.is_valid() {
        return Err(Error::GeometryRejected(GeometryReason::InvalidScale));
    }
    let mut decompressor = Decompressor::new()?;
    let header = decompressor.read_header(jpeg)?;
    decompressor.set_scaling_factor(request.scale.into())?;

    let width = request.scale.apply(header.width as u32);
    let height = request.scale.apply(header.height as u32);

    let image = match request.format {
        PixelFormat::Planar => {
            decode_planar(&mut decompressor, jpeg, width, height, header.subsamp)?
        }
        PixelFormat::Rgb565 => {
            let rgb = decode_packed(&mut decompressor, jpeg, width, height, PixelFormat::Rgb)?;
            let mut out = DecodedImage::packed(width, height, PixelFormat::Rgb565);
            if let (Some(src), Some(dst)) = (rgb.as_slice(), out.as_slice_mut()) {
                pack_rgb565(src, dst);
            }
            out
        }
        format => decode_packed(&mut decompressor, jpeg, width, height, format)?,
    };
    trace!("decoded {}", image);

    let image = image.rotate(request.rotation());
    match (request.crop, &request.destination) {
        (Some(crop), None) => image.crop_columns(crop.x, crop.width),
        _ => Ok(image),
    }
}

fn decode_packed(
    decompressor: &mut Decompressor,
    jpeg: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<DecodedImage> {
    let tj = tj_format(format).ok_or(Error::UnsupportedPixelFormat(format))?;
    let mut out = DecodedImage::packed(width, height, format);
    let pixels = out
        .as_slice_mut()
        .ok_or(Error::UnsupportedPixelFormat(format))?;
    decompressor.decompress(
        jpeg,
        Image {
            pixels,
            width: width as usize,
            pitch: width as usize * format.bytes_per_pixel(),
            height: height as usize,
            format: tj,
        },
    )?;
    Ok(out)
}

/// Decodes to Y, U and V planes at the image's own subsampling.
///
/// libjpeg-turbo pads the luma plane to a whole number of chroma samples;
/// the padding columns are dropped so plane widths match the hardware
/// layout.
fn decode_planar(
    decompressor: &mut Decompressor,
    jpeg: &[u8],
    width: u32,
    height: u32,
    subsamp: turbojpeg::Subsamp,
) -> Result<DecodedImage> {
    let subsampling = Subsampling::from(subsamp);
    if subsampling == Subsampling::Unknown {
        return Err(Error::GeometryRejected(
            GeometryReason::UnsupportedSubsampling,
        ));
    }
    let (hsf, vsf) = subsampling.factors();
    let padded_width = width.div_ceil(hsf) * hsf;
    let padded_height = height.div_ceil(vsf) * vsf;
    let (chroma_width, chroma_height) = if subsampling == Subsampling::Gray {
        (0, 0)
    } else {
        (padded_width / hsf, padded_height / vsf)
    };

    let luma_len = padded_width as usize * padded_height as usize;
    let chroma_len = chroma_width as usize * chroma_height as usize;
    let mut buf = vec![0u8; luma_len + 2 * chroma_len];
    decompressor.decompress_to_yuv(
        jpeg,
        YuvImage {
            pixels: buf.as_mut_slice(),
            width: width as usize,
            align: 1,
            height: height as usize,
            subsamp,
        },
    )?;

    let mut luma = Plane::new(width, height);
    for (dst, src) in luma
        .data
        .chunks_exact_mut((width as usize).max(1))
        .zip(buf[..luma_len].chunks_exact(padded_width as usize))
    {
        dst.copy_from_slice(&src[..width as usize]);
    }
    let plane = |offset: usize| Plane {
        width: chroma_width,
        height: chroma_height,
        data: buf[offset..offset + chroma_len].to_vec(),
    };
    let u = plane(luma_len);
    let v = plane(luma_len + chroma_len);
    Ok(DecodedImage::from_planes(width, height, [luma, u, v]))
}
