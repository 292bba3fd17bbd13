//! Criterion benchmarks for the bounded frame buffer.
//!
//! The video thread pushes every decoded frame through [`FrameBuffer`], so
//! push/pop must stay negligible next to a 30 fps frame interval.
//!
//! Run with:
//! ```bash
//! cargo bench --package camlink-core --bench frame_buffer_bench
//! ```

use camlink_core::{FrameBuffer, PixelFormat, VideoFrame, DEFAULT_FRAME_CAPACITY};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn make_frame(width: u32, height: u32) -> VideoFrame {
    let len = (width * height * 4) as usize;
    VideoFrame::new(width, height, PixelFormat::Rgba, vec![0u8; len])
}

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_buffer_push_pop");
    for (width, height) in [(320u32, 240u32), (1280, 720), (1920, 1080)] {
        let frame = make_frame(width, height);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &frame,
            |b, frame| {
                let mut buf = FrameBuffer::new(DEFAULT_FRAME_CAPACITY);
                b.iter(|| {
                    buf.push(black_box(frame.clone()));
                    black_box(buf.pop());
                });
            },
        );
    }
    group.finish();
}

fn bench_rejected_push(c: &mut Criterion) {
    c.bench_function("frame_buffer_rejected_push", |b| {
        let mut buf = FrameBuffer::new(DEFAULT_FRAME_CAPACITY);
        while buf.push(make_frame(2, 2)) {}
        let frame = make_frame(2, 2);
        b.iter(|| black_box(buf.push(black_box(frame.clone()))));
    });
}

criterion_group!(benches, bench_push_pop, bench_rejected_push);
criterion_main!(benches);
