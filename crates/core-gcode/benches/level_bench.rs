use core_gcode::{LevelOptions, Rewriter};
use core_surface::{Coeffs, fit};
use criterion::{Criterion, criterion_group, criterion_main};
use std::fmt::Write as _;
use std::hint::black_box;

fn synthetic_program(moves: usize) -> String {
    let mut src = String::from("G90\nG1 X0.5 Y0.5 Z0.2\n");
    for k in 1..=moves {
        let x = 0.5 + (k as f64 * 7.3) % 180.0;
        let y = 0.5 + (k as f64 * 3.1) % 180.0;
        writeln!(src, "G1 X{x:.3} Y{y:.3} Z0.2 E{:.4}", k as f64 * 0.05).unwrap();
    }
    src
}

fn probe_grid() -> Vec<[f64; 3]> {
    let mut pts = Vec::new();
    for xi in 0..5 {
        for yi in 0..5 {
            let (x, y) = (xi as f64 * 45.0, yi as f64 * 45.0);
            pts.push([x, y, 0.4 + 0.002 * x - 0.0015 * y + 0.00001 * x * y]);
        }
    }
    pts
}

fn bench_fit(c: &mut Criterion) {
    let pts = probe_grid();
    c.bench_function("fit_2x2", |b| {
        b.iter(|| fit(black_box(&pts), 2, 2));
    });
}

fn bench_rewrite(c: &mut Criterion) {
    let coeffs: Coeffs = fit(&probe_grid(), 2, 2);
    let opts = LevelOptions {
        max_line: 5.0,
        version: "bench".into(),
        ..LevelOptions::default()
    };
    let src = synthetic_program(1000);
    c.bench_function("rewrite_1k_moves", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(src.len() * 2);
            Rewriter::new(&coeffs, &opts, &mut out)
                .rewrite(black_box(src.as_bytes()))
                .unwrap();
            out
        });
    });
}

criterion_group!(benches, bench_fit, bench_rewrite);
criterion_main!(benches);
