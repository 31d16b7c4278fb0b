#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The dspbuf CLI requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod args;

#[cfg(feature = "streaming")]
mod cli {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::Context;
    use dspbuf::{
        open_output, AudioConfiguration, EngineOptions, LinearArena, RodioHardware, SquareWave,
    };
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    use crate::args::CliArgs;

    /// Producer tick: one emulated video frame
    const FRAME_INTERVAL: Duration = Duration::from_millis(20);

    /// Device arena size; room for the largest stereo buffer plus slack
    const ARENA_BYTES: usize = 1 << 20;

    pub fn run() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dspbuf=info")),
            )
            .init();

        let args = CliArgs::parse();
        if args.show_help {
            CliArgs::print_help();
            return Ok(());
        }

        let mut options = match &args.config_path {
            Some(path) => EngineOptions::load(path)
                .with_context(|| format!("loading engine options from {path}"))?,
            None => EngineOptions::default(),
        };
        if let Some(strategy) = args.strategy {
            options.strategy = strategy;
        }

        let requested = AudioConfiguration::new(args.sample_rate_hz, args.channels, args.frames);
        let config = requested.normalized()?;
        let generator = SquareWave::new(config.sample_rate_hz, config.channel_count, args.tone_hz, 48);

        println!("dspbuf - double-buffered PCM playback");
        println!("=====================================");
        println!("Sample rate:       {} Hz", config.sample_rate_hz);
        println!("Channels:          {}", config.channel_count);
        println!("Frames per half:   {}", config.frames_per_half_buffer);
        println!("Buffer latency:    {:.1} ms", config.latency_ms());
        println!("Refill strategy:   {:?}", options.strategy);
        println!();

        let mut output = open_output(
            requested,
            options,
            Box::new(RodioHardware::new()),
            Arc::new(LinearArena::new(ARENA_BYTES)),
            Box::new(generator),
        )?;
        if output.is_null() {
            println!("No audio device available; running silently.");
        }

        let start = Instant::now();
        let duration = Duration::from_secs_f32(args.seconds.max(0.0));
        let mut refills = 0usize;
        let mut consumed = 0usize;
        while start.elapsed() < duration {
            refills += output.pump()?;
            consumed += output.available();
            thread::sleep(FRAME_INTERVAL);
        }
        output.teardown();

        info!(refills, consumed, "playback finished");
        println!("Duration:          {:.2} seconds", start.elapsed().as_secs_f32());
        println!("Halves refilled:   {}", refills);
        println!("Bytes consumed:    {}", consumed);
        Ok(())
    }
}

#[cfg(feature = "streaming")]
fn main() -> anyhow::Result<()> {
    cli::run()
}
