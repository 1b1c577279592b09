// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{bgra_at, gradient_jpeg, sim_decoder, Behavior, PADDING_BGRA};
use edgefirst_hwjpeg::{
    geometry::{FrameBufferDestination, SurfaceTarget},
    software, Crop, DecodePath, DecodeRequest, DecoderConfig, Error, GeometryReason, JpegDecoder,
    Output, PixelFormat, Rotation, Scale,
};
use std::{error::Error as StdError, sync::atomic::Ordering, thread, time::Duration};
use turbojpeg::Subsamp;

type TestResult = Result<(), Box<dyn StdError>>;

#[test]
fn test_hardware_path() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(128, 64, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?;

    let decoded = decoder.decode(&jpeg, &request)?;
    assert!(decoded.is_hardware());
    let image = decoded.image().ok_or("expected an image")?;
    assert_eq!((image.width(), image.height()), (128, 64));
    let [b, g, r, _] = bgra_at(40, 20);
    assert_eq!(&image.as_slice().unwrap()[(20 * 128 + 40) * 3..][..3], &[r, g, b]);

    assert_eq!(shared.opened.load(Ordering::SeqCst), 1);
    assert_eq!(shared.live.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_disabled_hardware_uses_software() -> TestResult {
    let config = DecoderConfig::default().with_hardware(false);
    let (hardware, shared) = sim_decoder(config, Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(96, 80, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?;

    let decoded = decoder.decode(&jpeg, &request)?;
    assert_eq!(decoded.path, DecodePath::Software { reason: -1 });
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    assert_eq!(decoded.into_image(), Some(software::decode(&jpeg, &request)?));
    Ok(())
}

#[test]
fn test_small_image_never_opens_device() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(40, 30, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgba)?;

    let decoded = decoder.decode(&jpeg, &request)?;
    assert_eq!(decoded.path, DecodePath::Software { reason: -3 });
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    let image = decoded.image().ok_or("expected an image")?;
    assert_eq!(image.size(), 40 * 30 * 4);
    Ok(())
}

#[test]
fn test_completion_failure_falls_back() -> TestResult {
    let behavior = Behavior {
        fail_capture: true,
        ..Default::default()
    };
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), behavior);
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(320, 240, Subsamp::Sub2x1);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?
        .with_scale(Scale::new(1, 2))
        .with_rotation(Rotation::Right90);

    let decoded = decoder.decode(&jpeg, &request)?;
    assert_eq!(decoded.path, DecodePath::Software { reason: -12 });
    let image = decoded.image().ok_or("expected an image")?;
    assert_eq!((image.width(), image.height()), (120, 160));
    assert_eq!(shared.live.load(Ordering::SeqCst), 0);

    // The lock was released, so the next attempt reaches the device again.
    decoder.decode(&jpeg, &request)?;
    assert_eq!(shared.opened.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_direct_output() -> TestResult {
    let destination = FrameBufferDestination {
        target: SurfaceTarget::FrameBuffer(0),
        surface_width: 1024,
        surface_height: 600,
        image_width: 240,
        image_height: 320,
        x: 8,
        y: 8,
        rotation: Rotation::Left90,
    };
    let jpeg = gradient_jpeg(320, 240, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?.with_destination(destination);

    let (hardware, _) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoded = JpegDecoder::with_hardware(hardware).decode(&jpeg, &request)?;
    assert!(decoded.is_hardware());
    assert_eq!(decoded.output, Output::Direct);

    // On fallback the caller gets the rotated image to place itself.
    let behavior = Behavior {
        fail_capture: true,
        ..Default::default()
    };
    let (hardware, _) = sim_decoder(DecoderConfig::default(), behavior);
    let decoded = JpegDecoder::with_hardware(hardware).decode(&jpeg, &request)?;
    assert!(!decoded.is_hardware());
    let image = decoded.image().ok_or("expected an image")?;
    assert_eq!((image.width(), image.height()), (240, 320));
    Ok(())
}

#[test]
fn test_planar_444_falls_back() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(128, 96, Subsamp::None);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Planar)?;

    let decoded = decoder.decode(&jpeg, &request)?;
    assert_eq!(decoded.path, DecodePath::Software { reason: -7 });
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    let planes = decoded.image().and_then(|img| img.planes()).ok_or("expected planes")?;
    assert_eq!((planes[1].width, planes[1].height), (128, 96));
    Ok(())
}

#[test]
fn test_software_error_is_returned() {
    let decoder = JpegDecoder::new(DecoderConfig::default().with_hardware(false));
    let request = DecodeRequest::new(64, 64, PixelFormat::Rgb);
    assert!(matches!(
        decoder.decode(b"\xff\xd8 truncated", &request),
        Err(Error::Software(_))
    ));
}

#[test]
fn test_concurrent_decodes() -> TestResult {
    let behavior = Behavior {
        decode_time: Duration::from_millis(2),
        ..Default::default()
    };
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), behavior);
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(160, 120, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?;

    let paths: Vec<DecodePath> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| s.spawn(|| decoder.decode(&jpeg, &request).map(|d| d.path)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });

    assert!(paths.iter().all(|p| *p == DecodePath::Hardware));
    assert_eq!(shared.opened.load(Ordering::SeqCst), 6);
    assert_eq!(shared.max_live.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_zero_scale_is_an_error_not_a_panic() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(128, 64, Subsamp::Sub2x2);

    for scale in [Scale::new(1, 0), Scale::new(0, 2)] {
        let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?.with_scale(scale);
        assert!(matches!(
            decoder.decode(&jpeg, &request),
            Err(Error::GeometryRejected(GeometryReason::InvalidScale))
        ));
        assert!(matches!(
            software::decode(&jpeg, &request),
            Err(Error::GeometryRejected(GeometryReason::InvalidScale))
        ));
    }
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_overflowing_crop_is_an_error_not_a_panic() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(128, 64, Subsamp::Sub2x2);
    let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?.with_crop(Crop {
        x: u32::MAX,
        width: 2,
    });

    assert!(matches!(
        decoder.decode(&jpeg, &request),
        Err(Error::GeometryRejected(GeometryReason::CropOutOfBounds))
    ));
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_oversized_source_skips_hardware() -> TestResult {
    let (hardware, shared) = sim_decoder(DecoderConfig::default(), Behavior::default());
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(128, 64, Subsamp::Sub2x2);
    let mut request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Rgb)?;
    request.source_width = u32::MAX;
    request.source_height = 2;

    // The software path sizes itself from the header.
    let decoded = decoder.decode(&jpeg, &request)?;
    assert_eq!(decoded.path, DecodePath::Software { reason: -5 });
    assert_eq!(shared.opened.load(Ordering::SeqCst), 0);
    let image = decoded.image().ok_or("expected an image")?;
    assert_eq!((image.width(), image.height()), (128, 64));
    Ok(())
}

#[test]
fn test_rotated_padding_matches_software() -> TestResult {
    let behavior = Behavior {
        decode_jpeg: true,
        ..Default::default()
    };
    let (hardware, _) = sim_decoder(DecoderConfig::default(), behavior);
    let decoder = JpegDecoder::with_hardware(hardware);
    // Aligns to 112x64, leaving padding on both axes.
    let jpeg = gradient_jpeg(100, 60, Subsamp::Sub2x2);

    for rotation in [
        Rotation::None,
        Rotation::Right90,
        Rotation::Left90,
        Rotation::HorizontalFlip,
        Rotation::VerticalFlip,
        Rotation::Rotate180,
    ] {
        for format in [PixelFormat::Bgra, PixelFormat::Rgb] {
            let request = DecodeRequest::from_jpeg(&jpeg, format)?.with_rotation(rotation);
            let decoded = decoder.decode(&jpeg, &request)?;
            assert!(decoded.is_hardware(), "{rotation:?} {format}");
            let hw = decoded.into_image().ok_or("expected an image")?;
            let sw = software::decode(&jpeg, &request)?;
            assert_eq!((hw.width(), hw.height()), (sw.width(), sw.height()));
            assert!(hw == sw, "{rotation:?} {format} differs from software");
        }

        let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?.with_rotation(rotation);
        let hw = decoder
            .decode(&jpeg, &request)?
            .into_image()
            .ok_or("expected an image")?;
        let pixels = hw.as_slice().ok_or("expected packed pixels")?;
        assert!(pixels.chunks_exact(4).all(|px| px != PADDING_BGRA));
    }
    Ok(())
}

#[test]
fn test_flipped_crop_matches_software() -> TestResult {
    let behavior = Behavior {
        decode_jpeg: true,
        ..Default::default()
    };
    let (hardware, _) = sim_decoder(DecoderConfig::default(), behavior);
    let decoder = JpegDecoder::with_hardware(hardware);
    let jpeg = gradient_jpeg(100, 60, Subsamp::Sub2x2);

    for rotation in [Rotation::HorizontalFlip, Rotation::Right90] {
        let request = DecodeRequest::from_jpeg(&jpeg, PixelFormat::Bgra)?
            .with_rotation(rotation)
            .with_crop(Crop { x: 10, width: 40 });
        let decoded = decoder.decode(&jpeg, &request)?;
        assert!(decoded.is_hardware());
        let hw = decoded.into_image().ok_or("expected an image")?;
        assert!(hw == software::decode(&jpeg, &request)?, "{rotation:?}");
    }
    Ok(())
}
