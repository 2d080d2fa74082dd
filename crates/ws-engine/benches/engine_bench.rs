//! Render and scheduling throughput.
//!
//! Run with: cargo bench -p ws-engine --bench engine_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ws_engine::{AudioClock, Engine, Frame, ScheduledBatch, VoiceOutput, MIN_AUDIBLE_DURATION};
use ws_ir::{NoteEvent, Score, Track, TrackSet};

const SAMPLE_RATE: u32 = 44100;

/// Dense score: `tracks` tracks of sixteenth notes at 120 BPM for `seconds`.
fn dense_score(tracks: usize, seconds: f64) -> Score {
    let step = 0.125;
    let count = (seconds / step) as usize;
    let tracks = (0..tracks)
        .map(|t| {
            let notes = (0..count)
                .map(|i| NoteEvent::new(48 + ((t * 7 + i) % 36) as u8, i as f64 * step, step * 2.0, 0.8))
                .collect();
            Track::new(&format!("track {t}"), notes)
        })
        .collect();
    Score::new(tracks, 120.0, 480).expect("bench score is valid")
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");
    let mut block = vec![Frame::silence(); 512];
    group.throughput(Throughput::Elements(block.len() as u64));

    for tracks in [1, 8, 32] {
        let score = dense_score(tracks, 30.0);
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &score, |b, score| {
            let mut engine = Engine::new(SAMPLE_RATE);
            engine.allocate(score.track_count(), 8);
            let _batch = ScheduledBatch::schedule(&mut engine, score, 1.0, &TrackSet::new(), MIN_AUDIBLE_DURATION);
            engine.start(0.0);
            b.iter(|| {
                engine.render_block(black_box(&mut block));
                if engine.now() > score.duration_seconds() {
                    engine.start(0.0);
                }
            });
        });
    }

    group.finish();
}

fn bench_reschedule(c: &mut Criterion) {
    let score = dense_score(16, 120.0);
    c.bench_function("reschedule_on_speed_change", |b| {
        let mut engine = Engine::new(SAMPLE_RATE);
        engine.allocate(score.track_count(), 8);
        let mut batch = ScheduledBatch::schedule(&mut engine, &score, 1.0, &TrackSet::new(), MIN_AUDIBLE_DURATION);
        let mut speed = 1.0;
        b.iter(|| {
            batch.cancel(&mut engine);
            speed = if speed > 1.0 { 0.75 } else { 1.25 };
            batch = ScheduledBatch::schedule(&mut engine, black_box(&score), speed, &TrackSet::new(), MIN_AUDIBLE_DURATION);
        });
    });
}

criterion_group!(benches, bench_render, bench_reschedule);
criterion_main!(benches);
