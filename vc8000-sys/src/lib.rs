// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Raw bindings for the subset of the V4L2 multi-planar memory-to-memory API
//! used by the Nuvoton VC8000 JPEG decoder, plus the driver's private
//! post-processing ioctl.
//!
//! Layouts follow `linux/videodev2.h` on 64-bit Linux. Nothing here is safe to
//! call without a file descriptor for an open video device.

#![allow(non_camel_case_types)]

use std::os::raw::c_int;

pub const VIDEO_MAX_PLANES: usize = 8;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE: u32 = 10;

pub const V4L2_MEMORY_MMAP: u32 = 1;

pub const V4L2_CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
pub const V4L2_CAP_VIDEO_OUTPUT_MPLANE: u32 = 0x0000_2000;
pub const V4L2_CAP_VIDEO_M2M_MPLANE: u32 = 0x0000_4000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

pub const V4L2_BUF_FLAG_DONE: u32 = 0x0000_0004;
pub const V4L2_BUF_FLAG_ERROR: u32 = 0x0000_0040;
pub const V4L2_BUF_FLAG_LAST: u32 = 0x0010_0000;
/// End-of-stream marker understood by the VC8000 driver on OUTPUT buffers.
pub const V4L2_QCOM_BUF_FLAG_EOS: u32 = 0x0200_0000;

pub const V4L2_FIELD_NONE: u32 = 1;

pub const fn v4l2_fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
}

pub const V4L2_PIX_FMT_JPEG: u32 = v4l2_fourcc(b'J', b'P', b'E', b'G');
/// 32-bit BGRA, memory byte order B, G, R, A.
pub const V4L2_PIX_FMT_ABGR32: u32 = v4l2_fourcc(b'A', b'R', b'2', b'4');
/// 32-bit ARGB, memory byte order A, R, G, B.
pub const V4L2_PIX_FMT_ARGB32: u32 = v4l2_fourcc(b'B', b'A', b'2', b'4');
pub const V4L2_PIX_FMT_RGB565: u32 = v4l2_fourcc(b'R', b'G', b'B', b'P');
pub const V4L2_PIX_FMT_NV12: u32 = v4l2_fourcc(b'N', b'V', b'1', b'2');
pub const V4L2_PIX_FMT_YUYV: u32 = v4l2_fourcc(b'Y', b'U', b'Y', b'V');

/// Post-processing rotation operations accepted by `vc8k_pp_params::rotation`.
pub const PP_ROTATION_NONE: c_int = 0;
pub const PP_ROTATION_RIGHT_90: c_int = 1;
pub const PP_ROTATION_LEFT_90: c_int = 2;
pub const PP_ROTATION_HOR_FLIP: c_int = 3;
pub const PP_ROTATION_VER_FLIP: c_int = 4;
pub const PP_ROTATION_180: c_int = 5;

/// `pp_out_dst` value selecting `frame_buf_paddr` (or the internal capture
/// buffer when the address is zero) instead of a numbered frame buffer.
pub const PP_OUT_DST_ADDRESS: c_int = -1;

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_plane_pix_format {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_pix_format_mplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [v4l2_plane_pix_format; VIDEO_MAX_PLANES],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_format_fmt {
    pub pix_mp: v4l2_pix_format_mplane,
    pub raw_data: [u8; 200],
    // v4l2_window carries pointers, which gives the kernel union 8-byte alignment.
    _align: [u64; 25],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_fmt,
}

impl Default for v4l2_format {
    fn default() -> Self {
        Self {
            type_: 0,
            fmt: v4l2_format_fmt { _align: [0; 25] },
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_plane_m {
    pub mem_offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: v4l2_plane_m,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

impl Default for v4l2_plane {
    fn default() -> Self {
        Self {
            bytesused: 0,
            length: 0,
            m: v4l2_plane_m { userptr: 0 },
            data_offset: 0,
            reserved: [0; 11],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut v4l2_plane,
    pub fd: i32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl Default for v4l2_buffer {
    fn default() -> Self {
        Self {
            index: 0,
            type_: 0,
            bytesused: 0,
            flags: 0,
            field: 0,
            timestamp: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            timecode: v4l2_timecode::default(),
            sequence: 0,
            memory: 0,
            m: v4l2_buffer_m { userptr: 0 },
            length: 0,
            reserved2: 0,
            request_fd: 0,
        }
    }
}

/// Private post-processing configuration of the VC8000 driver.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default)]
pub struct vc8k_pp_params {
    pub enable_pp: c_int,
    /// Physical address of the destination frame buffer.
    pub frame_buf_paddr: u32,
    pub frame_buff_size: c_int,
    pub frame_buf_w: c_int,
    pub frame_buf_h: c_int,
    /// Placement of the image on the frame buffer.
    pub img_out_x: c_int,
    pub img_out_y: c_int,
    pub img_out_w: c_int,
    pub img_out_h: c_int,
    pub img_out_fmt: c_int,
    pub rotation: c_int,
    /// 0: fb0, 1: fb1, otherwise `frame_buf_paddr`.
    pub pp_out_dst: c_int,
    /// 0: v4l2 only, 1: libjpeg + v4l2.
    pub libjpeg_mode: c_int,
    pub reserved: [c_int; 8],
}

nix::ioctl_read!(vidioc_querycap, b'V', 0, v4l2_capability);
nix::ioctl_readwrite!(vidioc_s_fmt, b'V', 5, v4l2_format);
nix::ioctl_readwrite!(vidioc_reqbufs, b'V', 8, v4l2_requestbuffers);
nix::ioctl_readwrite!(vidioc_querybuf, b'V', 9, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_qbuf, b'V', 15, v4l2_buffer);
nix::ioctl_readwrite!(vidioc_dqbuf, b'V', 17, v4l2_buffer);
nix::ioctl_write_ptr!(vidioc_streamon, b'V', 18, c_int);
nix::ioctl_write_ptr!(vidioc_streamoff, b'V', 19, c_int);
nix::ioctl_write_ptr!(vc8kioc_pp_set_config, b'v', 91, vc8k_pp_params);
