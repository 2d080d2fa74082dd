//! woodshed CLI: practice playback and WAV export.
//!
//! Usage:
//!   woodshed etude.json --speed 0.8 --loop 4:8
//!   woodshed etude.json --trainer 0.6:1.0:0.05 --loop 4:8 --wav practice.wav

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, process, thread};

use tracing_subscriber::EnvFilter;
use woodshed::{load_config, load_score, CliArgs, FileConfig, PracticePlan, USAGE};
use ws_audio::WavOutput;
use ws_ir::{analyze, Score};
use ws_session::{LiveBackend, OfflineRenderer, PlaybackPhase, PlaybackSession, SessionEvent};

/// Display refresh for live playback.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Export length when neither `--seconds` nor the score end stops the render.
const MAX_EXPORT_SECONDS: f64 = 300.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("woodshed=info,ws_session=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match CliArgs::parse(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(err) => {
            eprintln!("error: {err:#}\n\n{USAGE}");
            process::exit(2);
        }
    };

    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };
    let plan = PracticePlan::resolve(file, &args)?;
    let score = Arc::new(load_score(&args.score)?);

    println!("Score:    {}", args.score.display());
    print!("{}", analyze(&score));
    println!();

    match &args.wav {
        Some(path) => render_to_wav(&plan, score, path, args.seconds),
        None => play_audio(&plan, score, args.seconds),
    }
}

fn play_audio(plan: &PracticePlan, score: Arc<Score>, seconds: Option<f64>) -> anyhow::Result<()> {
    let backend = LiveBackend::new(plan.session.buffer_ms);
    let mut session = PlaybackSession::new(backend, plan.session.clone())?;
    let events = session.subscribe();
    session.initialize()?;
    plan.start(&mut session, score)?;
    println!("Playing...");
    println!();

    let started = Instant::now();
    loop {
        session.tick();
        for event in events.try_iter() {
            report(&event);
        }
        if session.phase() == PlaybackPhase::Stopped {
            break;
        }
        if seconds.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
            session.stop();
            break;
        }

        let status = match session.phase() {
            PlaybackPhase::CountingIn => "count-in",
            _ => "playing ",
        };
        print!(
            "\r{status} {:>7.2}s / {:.2}s  x{:.3}",
            session.position(),
            session.duration(),
            session.speed()
        );
        let _ = std::io::stdout().flush();
        thread::sleep(FRAME_INTERVAL);
    }

    println!("\rDone.                                    ");
    Ok(())
}

fn report(event: &SessionEvent) {
    match event {
        SessionEvent::CountInClick { index, .. } => println!("\rClick {}", index + 1),
        SessionEvent::LoopWrapped { count, speed } => {
            println!("\rLoop {count} done, next pass at x{speed:.3}")
        }
        SessionEvent::Error { message } => eprintln!("\rError: {message}"),
        _ => {}
    }
}

fn render_to_wav(
    plan: &PracticePlan,
    score: Arc<Score>,
    path: &Path,
    seconds: Option<f64>,
) -> anyhow::Result<()> {
    let mut renderer = OfflineRenderer::new(plan.session.clone())?;
    let sample_rate = renderer.sample_rate();
    plan.start(renderer.session_mut(), score)?;

    println!("Rendering to {} at {} Hz...", path.display(), sample_rate);
    let mut wav = WavOutput::create(path, sample_rate)?;
    let frames = renderer.render_to(&mut wav, seconds.unwrap_or(MAX_EXPORT_SECONDS))?;
    wav.finalize()?;

    println!("Rendered {:.2}s", frames as f64 / sample_rate as f64);
    Ok(())
}
