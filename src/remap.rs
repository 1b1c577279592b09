// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel remapping from the decoder's native capture layouts.
//!
//! The post-processor always writes one of four layouts: packed 32-bit BGRA,
//! RGB565, NV12 or YUYV. The row converters in this module turn a captured
//! row into whatever the caller asked for. The packed converters work on
//! four pixels at a time as 32-bit words and finish with a scalar tail, which
//! keeps the inner loop free of per-byte bounds checks.
//!
//! All converters take exact-length slices; callers slice rows out of a
//! [`CaptureFrame`], which checks every read against the native row stride.

use crate::{
    error::{Error, Result},
    format::{NativeFormat, PixelFormat},
};

const BLOCK: usize = 64;

#[inline(always)]
fn word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline(always)]
fn put(bytes: &mut [u8], value: u32) {
    bytes[..4].copy_from_slice(&value.to_le_bytes());
}

/// Copies a BGRA row unchanged, 64 bytes at a time.
pub fn bgra_to_bgra(src: &[u8], dst: &mut [u8]) {
    let mut src_blocks = src.chunks_exact(BLOCK);
    let mut dst_blocks = dst.chunks_exact_mut(BLOCK);
    for (s, d) in (&mut src_blocks).zip(&mut dst_blocks) {
        d.copy_from_slice(s);
    }
    let tail = src_blocks.remainder();
    dst_blocks.into_remainder()[..tail.len()].copy_from_slice(tail);
}

/// BGRA word to a 24-bit value whose low three bytes are R, G, B.
#[inline(always)]
fn rgb24(p: u32) -> u32 {
    ((p >> 16) & 0xff) | (p & 0xff00) | ((p & 0xff) << 16)
}

/// BGRA word to a 24-bit value whose low three bytes are B, G, R.
#[inline(always)]
fn bgr24(p: u32) -> u32 {
    p & 0x00ff_ffff
}

/// Drops the alpha lane, packing four 24-bit pixels into three words.
#[inline(always)]
fn drop_alpha(src: &[u8], dst: &mut [u8], lanes: fn(u32) -> u32) {
    let mut src_chunks = src.chunks_exact(16);
    let mut dst_chunks = dst.chunks_exact_mut(12);
    for (s, d) in (&mut src_chunks).zip(&mut dst_chunks) {
        let q0 = lanes(word(&s[0..]));
        let q1 = lanes(word(&s[4..]));
        let q2 = lanes(word(&s[8..]));
        let q3 = lanes(word(&s[12..]));
        put(&mut d[0..], q0 | (q1 << 24));
        put(&mut d[4..], (q1 >> 8) | (q2 << 16));
        put(&mut d[8..], (q2 >> 16) | (q3 << 8));
    }
    let tail = src_chunks.remainder();
    let out = dst_chunks.into_remainder();
    for (s, d) in tail.chunks_exact(4).zip(out.chunks_exact_mut(3)) {
        d.copy_from_slice(&lanes(word(s)).to_le_bytes()[..3]);
    }
}

pub fn bgra_to_rgb(src: &[u8], dst: &mut [u8]) {
    drop_alpha(src, dst, rgb24);
}

pub fn bgra_to_bgr(src: &[u8], dst: &mut [u8]) {
    drop_alpha(src, dst, bgr24);
}

/// Permutes the four byte lanes of every pixel.
#[inline(always)]
fn permute(src: &[u8], dst: &mut [u8], lanes: fn(u32) -> u32) {
    let mut src_chunks = src.chunks_exact(16);
    let mut dst_chunks = dst.chunks_exact_mut(16);
    for (s, d) in (&mut src_chunks).zip(&mut dst_chunks) {
        put(&mut d[0..], lanes(word(&s[0..])));
        put(&mut d[4..], lanes(word(&s[4..])));
        put(&mut d[8..], lanes(word(&s[8..])));
        put(&mut d[12..], lanes(word(&s[12..])));
    }
    let tail = src_chunks.remainder();
    let out = dst_chunks.into_remainder();
    for (s, d) in tail.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        put(d, lanes(word(s)));
    }
}

pub fn bgra_to_rgba(src: &[u8], dst: &mut [u8]) {
    permute(src, dst, |p| rgb24(p) | (p & 0xff00_0000));
}

pub fn bgra_to_argb(src: &[u8], dst: &mut [u8]) {
    permute(src, dst, u32::swap_bytes);
}

pub fn bgra_to_abgr(src: &[u8], dst: &mut [u8]) {
    permute(src, dst, |p| p.rotate_left(8));
}

/// Converts one row of `width` native pixels into `format`.
///
/// `src` must hold exactly `width` native pixels and `dst` at least
/// `width * format.bytes_per_pixel()` bytes.
pub fn remap_row(
    native: NativeFormat,
    format: PixelFormat,
    src: &[u8],
    dst: &mut [u8],
    width: usize,
) -> Result<()> {
    let src_len = width * native.bytes_per_pixel();
    let dst_len = width * format.bytes_per_pixel();
    if src.len() < src_len {
        return Err(Error::InvalidState("source row shorter than requested width"));
    }
    if dst.len() < dst_len {
        return Err(Error::InvalidState("destination row too short"));
    }
    let (src, dst) = (&src[..src_len], &mut dst[..dst_len]);

    match (native, format) {
        (NativeFormat::Bgra32, PixelFormat::Bgra) => bgra_to_bgra(src, dst),
        (NativeFormat::Bgra32, PixelFormat::Rgb) => bgra_to_rgb(src, dst),
        (NativeFormat::Bgra32, PixelFormat::Bgr) => bgra_to_bgr(src, dst),
        (NativeFormat::Bgra32, PixelFormat::Rgba) => bgra_to_rgba(src, dst),
        (NativeFormat::Bgra32, PixelFormat::Argb) => bgra_to_argb(src, dst),
        (NativeFormat::Bgra32, PixelFormat::Abgr) => bgra_to_abgr(src, dst),
        (NativeFormat::Rgb565, PixelFormat::Rgb565) => dst.copy_from_slice(src),
        _ => return Err(Error::UnsupportedPixelFormat(format)),
    }
    Ok(())
}

/// Splits packed YUYV into Y, U and V rows at 4:2:2.
///
/// `src` starts at the pixel pair holding the first chroma sample. `y`
/// receives `y.len()` luma samples starting `luma_skip` pixels into `src`.
pub fn yuyv_row(src: &[u8], luma_skip: usize, y: &mut [u8], u: &mut [u8], v: &mut [u8]) {
    for (i, out) in y.iter_mut().enumerate() {
        *out = src[2 * (luma_skip + i)];
    }
    for (j, (cb, cr)) in u.iter_mut().zip(v.iter_mut()).enumerate() {
        *cb = src[4 * j + 1];
        *cr = src[4 * j + 3];
    }
}

/// De-interleaves an NV12 chroma row into U and V.
pub fn nv12_chroma_row(uv: &[u8], u: &mut [u8], v: &mut [u8]) {
    for ((pair, cb), cr) in uv.chunks_exact(2).zip(u.iter_mut()).zip(v.iter_mut()) {
        *cb = pair[0];
        *cr = pair[1];
    }
}

/// A decoded frame as the post-processor left it in a CAPTURE buffer.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    native: NativeFormat,
}

impl<'a> CaptureFrame<'a> {
    /// Wraps `data` as a `width`x`height` frame.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when `data` is smaller than such a frame.
    pub fn new(data: &'a [u8], width: u32, height: u32, native: NativeFormat) -> Result<Self> {
        if data.len() < native.frame_size(width, height) {
            return Err(Error::InvalidState("capture buffer smaller than its frame"));
        }
        Ok(Self {
            data,
            width,
            height,
            native,
        })
    }

    pub fn native(&self) -> NativeFormat {
        self.native
    }

    /// Bytes per row of the first plane.
    pub fn stride(&self) -> usize {
        self.width as usize * self.native.bytes_per_pixel()
    }

    /// `len` bytes of plane row `row` starting `start` bytes in, checked
    /// against the row stride.
    fn span(&self, plane_offset: usize, row: u32, start: usize, len: usize) -> Result<&'a [u8]> {
        let stride = self.stride();
        if start + len > stride {
            return Err(Error::InvalidState("read beyond the capture row stride"));
        }
        let begin = plane_offset + row as usize * stride + start;
        self.data
            .get(begin..begin + len)
            .ok_or(Error::InvalidState("read beyond the capture buffer"))
    }

    fn check_scanline(&self, scanline: u32) -> Result<()> {
        if scanline >= self.height {
            return Err(Error::InvalidState("scanline beyond captured height"));
        }
        Ok(())
    }

    /// Writes `width` pixels of row `scanline`, starting at `column_offset`,
    /// into `dst` as `format`.
    pub fn packed_row(
        &self,
        scanline: u32,
        column_offset: u32,
        width: u32,
        format: PixelFormat,
        dst: &mut [u8],
    ) -> Result<()> {
        self.check_scanline(scanline)?;
        let bpp = self.native.bytes_per_pixel();
        let src = self.span(
            0,
            scanline,
            column_offset as usize * bpp,
            width as usize * bpp,
        )?;
        remap_row(self.native, format, src, dst, width as usize)
    }

    /// Writes the luma of row `scanline` into `y` and, when given, its chroma
    /// into `u` and `v`.
    ///
    /// For NV12 the chroma comes from chroma row `scanline / 2`; for YUYV from
    /// the same row. Chroma rows hold `width.div_ceil(2)` samples starting at
    /// `column_offset / 2`.
    pub fn planar_row(
        &self,
        scanline: u32,
        column_offset: u32,
        width: u32,
        y: &mut [u8],
        chroma: Option<(&mut [u8], &mut [u8])>,
    ) -> Result<()> {
        self.check_scanline(scanline)?;
        let width = width as usize;
        let column = column_offset as usize;
        let chroma_column = column / 2;
        let chroma_width = width.div_ceil(2);
        if y.len() < width {
            return Err(Error::InvalidState("luma row too short"));
        }

        match self.native {
            NativeFormat::Nv12 => {
                let luma = self.span(0, scanline, column, width)?;
                y[..width].copy_from_slice(luma);
                if let Some((u, v)) = chroma {
                    if u.len() < chroma_width || v.len() < chroma_width {
                        return Err(Error::InvalidState("chroma row too short"));
                    }
                    let luma_plane = self.width as usize * self.height as usize;
                    let uv = self.span(
                        luma_plane,
                        scanline / 2,
                        2 * chroma_column,
                        2 * chroma_width,
                    )?;
                    nv12_chroma_row(uv, &mut u[..chroma_width], &mut v[..chroma_width]);
                }
                Ok(())
            }
            NativeFormat::Yuyv => {
                let skip = column - 2 * chroma_column;
                let pairs = (skip + width).div_ceil(2);
                let src = self.span(0, scanline, 4 * chroma_column, 4 * pairs)?;
                match chroma {
                    Some((u, v)) => {
                        if u.len() < chroma_width || v.len() < chroma_width {
                            return Err(Error::InvalidState("chroma row too short"));
                        }
                        yuyv_row(
                            src,
                            skip,
                            &mut y[..width],
                            &mut u[..chroma_width],
                            &mut v[..chroma_width],
                        );
                    }
                    None => yuyv_row(src, skip, &mut y[..width], &mut [], &mut []),
                }
                Ok(())
            }
            _ => Err(Error::UnsupportedPixelFormat(PixelFormat::Planar)),
        }
    }
}
