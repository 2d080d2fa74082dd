//! Command-line arguments.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use ws_ir::TrackSet;

pub const USAGE: &str = "\
Usage: woodshed <score.json> [options]

Options:
  --config <path>            TOML config file
  --speed <x>                playback speed (0.1 - 4.0)
  --loop <a:b>               practice loop in score seconds
  --count-in <n>             count in for n seconds before playing
  --trainer <start:end:inc>  raise the speed on every loop repetition
  --mute <i>                 mute track i (repeatable)
  --solo <i>                 play only track i
  --wav <path>               render to a WAV file instead of playing
  --seconds <n>              stop after n seconds
  -h, --help                 show this help";

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub score: PathBuf,
    pub config: Option<PathBuf>,
    pub speed: Option<f64>,
    pub loop_bounds: Option<(f64, f64)>,
    pub count_in: Option<f64>,
    pub trainer: Option<(f64, f64, f64)>,
    pub muted: TrackSet,
    pub solo: Option<usize>,
    pub wav: Option<PathBuf>,
    pub seconds: Option<f64>,
}

impl CliArgs {
    /// Parse arguments, program name excluded. `Ok(None)` means help was
    /// requested.
    pub fn parse<I>(args: I) -> anyhow::Result<Option<Self>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut parsed = CliArgs::default();
        let mut score = None;

        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .ok_or_else(|| anyhow!("{arg} needs a value"))
            };
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--config" => parsed.config = Some(PathBuf::from(value()?)),
                "--speed" => parsed.speed = Some(number(&value()?, "--speed")?),
                "--loop" => {
                    let [a, b] = fields(&value()?, "--loop")?;
                    parsed.loop_bounds = Some((a, b));
                }
                "--count-in" => parsed.count_in = Some(number(&value()?, "--count-in")?),
                "--trainer" => {
                    let [start, end, increment] = fields(&value()?, "--trainer")?;
                    parsed.trainer = Some((start, end, increment));
                }
                "--mute" => {
                    parsed.muted.insert(number(&value()?, "--mute")?);
                }
                "--solo" => parsed.solo = Some(number(&value()?, "--solo")?),
                "--wav" => parsed.wav = Some(PathBuf::from(value()?)),
                "--seconds" => parsed.seconds = Some(number(&value()?, "--seconds")?),
                flag if flag.starts_with('-') => bail!("unknown option {flag}"),
                _ if score.is_some() => bail!("unexpected argument {arg}"),
                _ => score = Some(PathBuf::from(&arg)),
            }
        }

        parsed.score = score.ok_or_else(|| anyhow!("missing score file"))?;
        Ok(Some(parsed))
    }
}

fn number<T>(text: &str, flag: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.trim()
        .parse()
        .with_context(|| format!("{flag}: cannot parse {text:?}"))
}

/// Split `a:b[:c]` into exactly `N` numbers.
fn fields<const N: usize>(text: &str, flag: &str) -> anyhow::Result<[f64; N]> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != N {
        bail!("{flag}: expected {N} values separated by ':', got {text:?}");
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = number(part, flag)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Option<CliArgs>> {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_every_option() {
        let args = parse(&[
            "etude.json",
            "--speed",
            "0.75",
            "--loop",
            "2:4.5",
            "--count-in",
            "3",
            "--trainer",
            "0.5:1:0.05",
            "--mute",
            "1",
            "--mute",
            "2",
            "--solo",
            "0",
            "--wav",
            "out.wav",
            "--seconds",
            "30",
        ])
        .unwrap()
        .unwrap();
        assert_eq!(args.score, PathBuf::from("etude.json"));
        assert_eq!(args.speed, Some(0.75));
        assert_eq!(args.loop_bounds, Some((2.0, 4.5)));
        assert_eq!(args.count_in, Some(3.0));
        assert_eq!(args.trainer, Some((0.5, 1.0, 0.05)));
        assert_eq!(args.muted, TrackSet::from([1, 2]));
        assert_eq!(args.solo, Some(0));
        assert_eq!(args.wav, Some(PathBuf::from("out.wav")));
        assert_eq!(args.seconds, Some(30.0));
    }

    #[test]
    fn help_short_circuits() {
        assert!(parse(&["--help"]).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.json", "--speed"]).is_err());
        assert!(parse(&["a.json", "--loop", "2"]).is_err());
        assert!(parse(&["a.json", "--mute", "x"]).is_err());
        assert!(parse(&["a.json", "--frobnicate"]).is_err());
        assert!(parse(&["a.json", "b.json"]).is_err());
    }
}
