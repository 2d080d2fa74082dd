//! Allocation-free render path tests.
//!
//! These tests verify that `Engine::render_block()` does not allocate once a
//! batch is scheduled: not while notes trigger, voices get stolen, the clock
//! is repositioned or clicks sound.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use std::path::PathBuf;

use ws_engine::{AudioClock, Engine, Frame, ScheduledBatch, VoiceOutput, MIN_AUDIBLE_DURATION};
use ws_ir::{NoteEvent, Score, Track, TrackSet};

const RATE: u32 = 44100;

fn fixture_score() -> Score {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/etude.json");
    woodshed::load_score(path).unwrap()
}

/// Schedule `score` at `speed` and render `seconds` of audio, aborting on
/// any heap allocation.
fn assert_render_alloc_free(score: &Score, speed: f64, voices: usize, seconds: f64) {
    let mut engine = Engine::new(RATE);
    engine.allocate(score.track_count(), voices);
    let _batch = ScheduledBatch::schedule(
        &mut engine,
        score,
        speed,
        &TrackSet::new(),
        MIN_AUDIBLE_DURATION,
    );
    engine.start(0.0);

    let mut block = [Frame::silence(); 512];
    let blocks = (seconds * RATE as f64 / block.len() as f64) as usize;
    // Warm up so first-use log callsites register outside the check
    engine.render_block(&mut block);
    assert_no_alloc(|| {
        for _ in 0..blocks {
            engine.render_block(&mut block);
        }
    });
}

#[test]
fn etude_alloc_free() {
    assert_render_alloc_free(&fixture_score(), 1.0, 8, 10.0);
}

#[test]
fn slow_etude_alloc_free() {
    assert_render_alloc_free(&fixture_score(), 0.5, 8, 5.0);
}

#[test]
fn voice_stealing_alloc_free() {
    // Dense cluster on one voice slot: every trigger steals
    let notes = (0..200)
        .map(|i| NoteEvent::new(40 + (i % 40) as u8, i as f64 * 0.01, 1.0, 0.5))
        .collect();
    let score = Score::new(vec![Track::new("cluster", notes)], 120.0, 480).unwrap();
    assert_render_alloc_free(&score, 1.0, 1, 3.0);
}

#[test]
fn reposition_and_clicks_alloc_free() {
    let score = fixture_score();
    let mut engine = Engine::new(RATE);
    engine.allocate(score.track_count(), 8);
    let _batch = ScheduledBatch::schedule(
        &mut engine,
        &score,
        1.0,
        &TrackSet::new(),
        MIN_AUDIBLE_DURATION,
    );
    engine.start(0.0);

    let mut block = [Frame::silence(); 256];
    assert_no_alloc(|| {
        for pass in 0..20 {
            for _ in 0..40 {
                engine.render_block(&mut block);
            }
            engine.click(pass % 4 == 0);
            engine.start(2.5);
        }
        engine.silence_all();
        engine.render_block(&mut block);
    });
}
