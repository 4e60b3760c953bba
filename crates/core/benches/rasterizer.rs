use badge_core::framebuffer::{BlitFlags, BlitRegion, Framebuffer};
use badge_core::memory_map::FRAMEBUFFER_END;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_fill_screen(c: &mut Criterion) {
    let mut fb = Framebuffer::new();
    let mut memory = vec![0u8; FRAMEBUFFER_END];
    c.bench_function("fill_screen", |b| {
        b.iter(|| {
            fb.canvas(&mut memory).fill_screen(black_box(0x2945));
            black_box(fb.count_changed_pixels_and_reset());
        });
    });
}

fn bench_oval(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_oval");

    for size in [8, 32, 120].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut fb = Framebuffer::new();
            let mut memory = vec![0u8; FRAMEBUFFER_END];
            b.iter(|| {
                fb.canvas(&mut memory)
                    .draw_oval(Some(0xFFFF), Some(0x07E0), 20, 4, size, size);
                black_box(fb.count_changed_pixels_and_reset());
            });
        });
    }

    group.finish();
}

fn bench_lines(c: &mut Criterion) {
    let mut fb = Framebuffer::new();
    let mut memory = vec![0u8; FRAMEBUFFER_END];
    c.bench_function("draw_line_fan", |b| {
        b.iter(|| {
            let mut canvas = fb.canvas(&mut memory);
            for x in (0..160).step_by(8) {
                canvas.draw_line(0xF800, 80, 0, x, 127);
            }
            black_box(fb.count_changed_pixels_and_reset());
        });
    });
}

fn bench_text(c: &mut Criterion) {
    let mut fb = Framebuffer::new();
    let mut memory = vec![0u8; FRAMEBUFFER_END];
    let text = b"The quick brown\nfox jumps over\nthe lazy dog.";
    c.bench_function("draw_text", |b| {
        b.iter(|| {
            fb.canvas(&mut memory)
                .draw_text(Some(0xFFFF), Some(0x0000), black_box(text), 4, 4);
            black_box(fb.count_changed_pixels_and_reset());
        });
    });
}

fn bench_blit(c: &mut Criterion) {
    let mut group = c.benchmark_group("blit");
    let sprite: Vec<u8> = (0..32 * 32 / 4).map(|i| i as u8).collect();
    let palette = [Some(0x0000), Some(0x5555), None, Some(0xFFFF)];

    for (name, flags) in [
        ("plain", BlitFlags::empty()),
        ("flip_x", BlitFlags::FLIP_X),
        ("rotate", BlitFlags::ROTATE),
    ] {
        group.bench_function(name, |b| {
            let mut fb = Framebuffer::new();
            let mut memory = vec![0u8; FRAMEBUFFER_END];
            b.iter(|| {
                fb.canvas(&mut memory).blit_palette(
                    &palette,
                    &sprite,
                    &BlitRegion::sprite(10, 10, 32, 32),
                    flags,
                );
                black_box(fb.count_changed_pixels_and_reset());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fill_screen,
    bench_oval,
    bench_lines,
    bench_text,
    bench_blit
);
criterion_main!(benches);
