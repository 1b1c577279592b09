use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_hwjpeg::{image::encode_jpeg, software, DecodeRequest, PixelFormat, Scale};

fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let rgb: Vec<u8> = (0..width * height)
        .flat_map(|i| {
            let (x, y) = (i % width, i / width);
            [(x * 255 / width) as u8, (y * 255 / height) as u8, 96]
        })
        .collect();
    encode_jpeg(
        &rgb,
        width,
        height,
        PixelFormat::Rgb,
        90,
        turbojpeg::Subsamp::Sub2x2,
    )
    .unwrap()
    .to_vec()
}

pub fn benchmark_software(c: &mut Criterion) {
    let fmts = [PixelFormat::Rgb, PixelFormat::Bgra, PixelFormat::Rgb565, PixelFormat::Planar];
    let dims = [(320, 240), (640, 480), (1280, 720), (1920, 1080)];
    let scales = [Scale::ONE, Scale::new(1, 2)];

    for fmt in fmts.iter() {
        let mut group = c.benchmark_group(format!("software/{}", fmt));
        for dim in dims.iter() {
            let jpeg = gradient_jpeg(dim.0, dim.1);
            for scale in scales.iter() {
                let request = DecodeRequest::from_jpeg(&jpeg, *fmt)
                    .unwrap()
                    .with_scale(*scale);
                group.bench_with_input(
                    format!("{}x{}-{}/{}", dim.0, dim.1, scale.num, scale.denom),
                    &(jpeg.clone(), request),
                    |b, (jpeg, request)| b.iter(|| software::decode(jpeg, request).unwrap()),
                );
            }
        }
    }
}

criterion_group!(benches, benchmark_software);
criterion_main!(benches);
