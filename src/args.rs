//! Command-line argument parsing for the dspbuf demo player.

use dspbuf::DispatchStrategy;

/// Parsed command-line arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Requested sample rate
    pub sample_rate_hz: u32,
    /// 1 (mono) or 2 (stereo)
    pub channels: u16,
    /// Requested frames per half-buffer (0 = default)
    pub frames: usize,
    /// Force the polling refill strategy
    pub strategy: Option<DispatchStrategy>,
    /// Engine options file (JSON)
    pub config_path: Option<String>,
    /// Tone frequency in Hz
    pub tone_hz: f32,
    /// How long to play
    pub seconds: f32,
    /// Whether help was requested
    pub show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            sample_rate_hz: 22_050,
            channels: 2,
            frames: 0,
            strategy: None,
            config_path: None,
            tone_hz: 440.0,
            seconds: 3.0,
            show_help: false,
        }
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>, show_help: &mut bool) -> Option<T> {
    match value.as_deref().map(str::parse::<T>) {
        Some(Ok(parsed)) => Some(parsed),
        Some(Err(_)) => {
            eprintln!("Invalid value for {}: {}", flag, value.unwrap_or_default());
            *show_help = true;
            None
        }
        None => {
            eprintln!("{} requires an argument", flag);
            *show_help = true;
            None
        }
    }
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args().skip(1))
    }

    /// Parse arguments from any iterator (program name already skipped).
    pub fn parse_from<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut args = Self::default();
        let mut iter = iter.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => args.show_help = true,
                "--polling" => args.strategy = Some(DispatchStrategy::Polling),
                "--rate" => {
                    if let Some(v) = parse_value(&arg, iter.next(), &mut args.show_help) {
                        args.sample_rate_hz = v;
                    }
                }
                "--channels" => {
                    if let Some(v) = parse_value(&arg, iter.next(), &mut args.show_help) {
                        args.channels = v;
                    }
                }
                "--frames" => {
                    if let Some(v) = parse_value(&arg, iter.next(), &mut args.show_help) {
                        args.frames = v;
                    }
                }
                "--tone" => {
                    if let Some(v) = parse_value(&arg, iter.next(), &mut args.show_help) {
                        args.tone_hz = v;
                    }
                }
                "--seconds" => {
                    if let Some(v) = parse_value(&arg, iter.next(), &mut args.show_help) {
                        args.seconds = v;
                    }
                }
                "--config" => match iter.next() {
                    Some(path) => args.config_path = Some(path),
                    None => {
                        eprintln!("--config requires a path");
                        args.show_help = true;
                    }
                },
                _ => {
                    eprintln!("Unknown argument: {}", arg);
                    args.show_help = true;
                }
            }
        }

        args
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  dspbuf [--rate <hz>] [--channels <1|2>] [--frames <n>] [--polling]\n\
             \x20        [--config <file.json>] [--tone <hz>] [--seconds <s>]\n\n\
             Flags:\n\
             \x20 --rate <hz>          Sample rate (default 22050)\n\
             \x20 --channels <n>       1 = mono, 2 = stereo (default 2)\n\
             \x20 --frames <n>         Frames per half-buffer, rounded down to a multiple of 4\n\
             \x20                      (0 = 4096)\n\
             \x20 --polling            Detect drained halves from the read cursor\n\
             \x20 --config <file>      Engine options (JSON)\n\
             \x20 --tone <hz>          Square wave frequency (default 440)\n\
             \x20 --seconds <s>        Playback duration (default 3)\n\
             \x20 -h, --help           Show this help\n\n\
             Logging:\n\
             \x20 RUST_LOG=dspbuf=debug dspbuf --polling\n"
        );
    }
}
