//! End-to-end playback scenarios driven through the software channel

use dspbuf::{
    convert_sign, AudioConfiguration, AudioEngine, ChannelTap, ConstantGenerator, DspBufError,
    EngineOptions, FnGenerator, Half, HalfState, LinearArena, PushSource, SampleGenerator,
    SampleWidth, SoftwareChannel,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn start_engine(
    requested: AudioConfiguration,
    options: EngineOptions,
    generator: Box<dyn SampleGenerator>,
) -> (AudioEngine, ChannelTap, Arc<LinearArena>) {
    let arena = Arc::new(LinearArena::new(1 << 20));
    let (channel, tap) = SoftwareChannel::new();
    let engine = AudioEngine::setup(requested, options, Box::new(channel), arena.clone(), generator)
        .unwrap();
    (engine, tap, arena)
}

/// Fills each refill with the next value from 1 up to `last`, then unsigned silence
fn counting_generator(last: u8) -> FnGenerator<impl FnMut(usize, &mut [u8]) + Send> {
    let mut next = 1u8;
    FnGenerator::new(move |_, dest: &mut [u8]| {
        if next <= last {
            dest.fill(next);
            next += 1;
        } else {
            dest.fill(0x80);
        }
    })
}

#[test]
fn test_default_stereo_setup_allocates_silent_buffer() {
    let (engine, tap, arena) = start_engine(
        AudioConfiguration::new(22_050, 2, 0),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x3C)),
    );

    let config = engine.config();
    assert_eq!(config.frames_per_half_buffer, 4096);
    assert_eq!(config.sample_width_bytes, 1);

    let buffer = engine.buffer().unwrap();
    assert_eq!(buffer.size_bytes(), 16_384);
    assert_eq!(arena.in_use(), 16_384);
    for half in [Half::A, Half::B] {
        assert!(buffer.snapshot_half(half).iter().all(|&b| b == 0));
    }
    assert_eq!(tap.queued(), vec![Half::A, Half::B]);
}

#[test]
fn test_constant_generator_is_biased_on_refill() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(22_050, 2, 0),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x3C)),
    );
    let mut out = Vec::new();
    tap.render(4096, &mut out);
    assert_eq!(engine.pump().unwrap(), 1);

    let mut data = engine.buffer().unwrap().snapshot_half(Half::A);
    assert_eq!(data.len(), 8192);
    assert!(data.iter().all(|&b| b == 0xBC));
    convert_sign(&mut data, SampleWidth::Bits8);
    assert!(data.iter().all(|&b| b == 0x3C));
}

#[test]
fn test_pause_resume_discards_stale_audio() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, 32),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x10)),
    );
    let mut out = Vec::new();
    tap.render(64, &mut out);
    assert_eq!(engine.pump().unwrap(), 2);

    engine.pause();
    for half in [Half::A, Half::B] {
        assert_eq!(engine.half_state(half), Some(HalfState::Silent));
    }
    engine.resume().unwrap();
    assert_eq!(tap.queued(), vec![Half::A, Half::B]);

    out.clear();
    tap.render(64, &mut out);
    assert_eq!(out.len(), 64);
    assert!(out.iter().all(|&b| b == 0));
}

#[test]
fn test_refills_alternate_over_many_cycles() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, 16),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x40)),
    );
    let mut out = Vec::new();
    let mut order = Vec::new();
    for _ in 0..50 {
        tap.render(16, &mut out);
        assert_eq!(engine.pump().unwrap(), 1);
        order.push(*tap.queued().last().unwrap());
    }
    assert_eq!(order[0], Half::A);
    for pair in order.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    assert_eq!(engine.stats().out_of_order, 0);
}

#[test]
fn test_queued_halves_are_always_complete() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 2, 12),
        EngineOptions::default(),
        Box::new(counting_generator(60)),
    );
    let mut out = Vec::new();
    // Uneven render sizes stop mid-half most of the time
    for step in 0..60 {
        tap.render(5 + step % 11, &mut out);
        engine.pump().unwrap();
        let buffer = engine.buffer().unwrap();
        for half in tap.queued() {
            assert_eq!(buffer.state(half), HalfState::Queued);
            let data = buffer.snapshot_half(half);
            assert!(data.iter().all(|&b| b == data[0]), "torn half {half}");
        }
    }
}

#[test]
fn test_polling_strategy_end_to_end() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, 20),
        EngineOptions::polling(),
        Box::new(counting_generator(40)),
    );
    let mut out = Vec::new();
    for _ in 0..30 {
        tap.render(7, &mut out);
        engine.pump().unwrap();
    }
    assert!(engine.stats().refills >= 8);
    assert_eq!(engine.stats().out_of_order, 0);

    // Past the two silent halves, values arrive as whole halves in increasing order
    let played: Vec<u8> = out.iter().filter(|&&b| b != 0).map(|&b| b ^ 0x80).collect();
    for (i, chunk) in played.chunks(20).enumerate() {
        if chunk.len() == 20 {
            assert!(chunk.iter().all(|&b| b == i as u8 + 1));
        }
    }
}

#[test]
fn test_polling_recovers_from_underrun() {
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, 8),
        EngineOptions::polling(),
        Box::new(counting_generator(40)),
    );
    // Producer misses its tick: both halves play and the cursor parks on the wrap
    let mut out = Vec::new();
    tap.render(20, &mut out);
    assert_eq!(tap.position(), 0);

    for _ in 0..10 {
        engine.pump().unwrap();
        tap.render(4, &mut out);
    }
    assert!(engine.stats().refills >= 6);
    assert_eq!(engine.stats().out_of_order, 0);
    assert_eq!(tap.starved_frames(), 4);

    let played: Vec<u8> = out.iter().filter(|&&b| b != 0).map(|&b| b ^ 0x80).collect();
    assert!(played.len() >= 32);
    for (i, chunk) in played.chunks(8).enumerate() {
        if chunk.len() == 8 {
            assert!(chunk.iter().all(|&b| b == i as u8 + 1), "half {i}");
        }
    }
}

#[test]
fn test_push_source_pads_missing_bytes() {
    let (source, sink) = PushSource::new(256).unwrap();
    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, 8),
        EngineOptions::default(),
        Box::new(source),
    );
    sink.write(&[0x90, 0xA0, 0xB0]);

    let mut out = Vec::new();
    tap.render(8, &mut out);
    engine.pump().unwrap();
    let data = engine.buffer().unwrap().snapshot_half(Half::A);
    assert_eq!(data, vec![0x10, 0x20, 0x30, 0, 0, 0, 0, 0]);
}

#[test]
fn test_no_completions_after_teardown() {
    let (mut engine, tap, arena) = start_engine(
        AudioConfiguration::new(8000, 1, 8),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x20)),
    );
    let mut out = Vec::new();
    tap.render(4, &mut out);
    engine.teardown();
    assert_eq!(arena.in_use(), 0);

    let completed = tap.completed_halves();
    out.clear();
    assert_eq!(tap.render(32, &mut out), 0);
    assert!(out.iter().all(|&b| b == 0));
    assert_eq!(tap.completed_halves(), completed);
    assert!(matches!(engine.pump(), Err(DspBufError::TornDown)));
}

#[test]
fn test_concurrent_drain_sees_whole_halves_in_order() {
    const FRAMES: usize = 64;
    const REFILLS: u8 = 100;

    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, FRAMES),
        EngineOptions::default(),
        Box::new(counting_generator(REFILLS)),
    );

    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let tap = tap.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut out = Vec::new();
            let mut audible = 0;
            let target = REFILLS as usize * FRAMES;
            let deadline = Instant::now() + Duration::from_secs(10);
            while audible < target && Instant::now() < deadline {
                let start = out.len();
                tap.render(7, &mut out);
                audible += out[start..].iter().filter(|&&b| b != 0).count();
                thread::sleep(Duration::from_micros(50));
            }
            done.store(true, Ordering::Release);
            out
        })
    };

    while !done.load(Ordering::Acquire) {
        engine.pump().unwrap();
        thread::sleep(Duration::from_micros(100));
    }
    let out = consumer.join().unwrap();
    engine.teardown();

    let played: Vec<u8> = out.into_iter().filter(|&b| b != 0).map(|b| b ^ 0x80).collect();
    assert_eq!(played.len(), REFILLS as usize * FRAMES);
    for (i, chunk) in played.chunks(FRAMES).enumerate() {
        assert!(
            chunk.iter().all(|&b| b == i as u8 + 1),
            "half {i} torn or out of order"
        );
    }
}

#[test]
fn test_pause_resume_while_draining() {
    const FRAMES: usize = 32;

    let (mut engine, tap, _arena) = start_engine(
        AudioConfiguration::new(8000, 1, FRAMES),
        EngineOptions::default(),
        Box::new(ConstantGenerator::new(0x55)),
    );

    let done = Arc::new(AtomicBool::new(false));
    let consumer = {
        let tap = tap.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut out = Vec::new();
            while !done.load(Ordering::Acquire) {
                tap.render(5, &mut out);
                out.clear();
                thread::sleep(Duration::from_micros(50));
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    let pump_until = |engine: &mut AudioEngine, refills: u64| {
        while engine.stats().refills < refills && Instant::now() < deadline {
            engine.pump().unwrap();
            thread::sleep(Duration::from_micros(100));
        }
    };

    let mut target = 0;
    for _ in 0..5 {
        target += 10;
        pump_until(&mut engine, target);
        engine.pause();
        thread::sleep(Duration::from_millis(1));
        engine.resume().unwrap();
    }
    // Both halves keep cycling after the last resume
    target += 20;
    pump_until(&mut engine, target);

    done.store(true, Ordering::Release);
    consumer.join().unwrap();

    assert!(engine.stats().refills >= target, "stalled at {:?}", engine.stats());
    assert_eq!(engine.stats().out_of_order, 0);
    assert_eq!(tap.dropped_completions(), 0);
    engine.teardown();
}
