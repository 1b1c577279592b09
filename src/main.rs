// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::Args;
use clap::Parser;
use edgefirst_hwjpeg::{DecodePath, DecodedImage, DecoderConfig, JpegDecoder, Output, Pixels};
use std::{
    error::Error,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    time::Instant,
};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

mod args;

fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose { "debug" } else { "info" };
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    // Not every target runs systemd.
    let journald = tracing_journald::layer()
        .ok()
        .map(|layer| layer.with_filter(LevelFilter::INFO));

    let tracy = args.tracy.then(|| {
        tracy_client::Client::start();
        tracing_tracy::TracyLayer::default()
    });

    let subscriber = tracing_subscriber::registry()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn write_image(path: &Path, image: &DecodedImage) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    match image.pixels() {
        Pixels::Packed(data) => out.write_all(data)?,
        Pixels::Planar(planes) => {
            for plane in planes {
                out.write_all(&plane.data)?;
            }
        }
    }
    out.flush()
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let jpeg = fs::read(&args.input)?;
    let request = args.request(&jpeg)?;
    info!(
        "{} {}x{} {:?} -> {} scale {}/{} {:?}",
        args.input.display(),
        request.source_width,
        request.source_height,
        request.subsampling,
        request.format,
        request.scale.num,
        request.scale.denom,
        request.rotation,
    );

    let decoder = JpegDecoder::new(DecoderConfig::from(&args));
    let start = Instant::now();
    let decoded = decoder.decode(&jpeg, &request)?;
    let elapsed = start.elapsed();

    match decoded.path {
        DecodePath::Hardware => info!("hardware decode in {:?}", elapsed),
        DecodePath::Software { reason } if args.software => {
            info!("software decode in {:?} ({})", elapsed, reason)
        }
        DecodePath::Software { reason } => {
            warn!("hardware declined ({}), software decode in {:?}", reason, elapsed)
        }
    }

    match &decoded.output {
        Output::Image(image) => {
            write_image(&args.output, image)?;
            info!("wrote {} to {}", image, args.output.display());
        }
        Output::Direct => info!("image written to the destination surface"),
    }

    Ok(())
}
