//! Allocation-free audio callback tests.
//!
//! Once prepared and attached, `BeatProcessor::process_block()` must not
//! touch the allocator as long as the host tempo stays above the reserved
//! minimum tempo. Consumers attached through a port and streams prepared
//! again with a consumer attached are covered too.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use beatsnap_core::{BeatProcessor, TrackerConfig, TransportInfo};

const SAMPLE_RATE: f64 = 48_000.0;
const BLOCK: usize = 256;

/// Plays `blocks` blocks of stereo audio, with the tempo for each block given
/// by `tempo`, looping back by `loop_beats` whenever the position passes it.
fn play(processor: &mut BeatProcessor, blocks: usize, loop_beats: f64, tempo: impl Fn(usize) -> f64) -> u64 {
    let mut left = vec![0.0f32; BLOCK];
    let mut right = vec![0.0f32; BLOCK];
    let mut receiver = processor.attach_consumer();
    let mut received = 0u64;
    let mut ppq = 0.0;

    assert_no_alloc(|| {
        for index in 0..blocks {
            let bpm = tempo(index);
            for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
                let phase = (index * BLOCK + i) as f32 * 0.01;
                *l = phase.sin();
                *r = phase.cos();
            }

            let mut block = [&mut left[..], &mut right[..]];
            processor.process_block(&mut block, 2, &TransportInfo::playing(bpm, ppq));

            if receiver.poll().is_some() {
                received += 1;
            }

            ppq += bpm / 60.0 * BLOCK as f64 / SAMPLE_RATE;
            if ppq >= loop_beats {
                ppq -= loop_beats;
            }
        }
    });

    received
}

#[test]
fn steady_tempo_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), SAMPLE_RATE, 2).unwrap();
    let received = play(&mut processor, 48_000 * 10 / BLOCK, 1_000.0, |_| 120.0);
    assert!(received >= 19);
    assert_eq!(processor.dispatch_stats().dropped, 0);
}

#[test]
fn looping_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), SAMPLE_RATE, 2).unwrap();
    let received = play(&mut processor, 48_000 * 10 / BLOCK, 4.0, |_| 128.0);
    assert!(received > 0);
    assert_eq!(processor.dispatch_stats().dropped, 0);
}

#[test]
fn tempo_changes_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), SAMPLE_RATE, 2).unwrap();
    let tempi = [60.0, 90.0, 120.0, 174.0, 45.0];
    let received = play(&mut processor, 48_000 * 10 / BLOCK, 16.0, |index| {
        tempi[(index / 200) % tempi.len()]
    });
    assert!(received > 0);
}

#[test]
fn prepare_with_attached_consumer_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), 44_100.0, 2).unwrap();
    let mut receiver = processor.attach_consumer();
    processor.prepare(96_000.0, 2).unwrap();

    let mut left = vec![0.25f32; BLOCK];
    let mut right = vec![-0.25f32; BLOCK];
    let mut ppq = 0.0;
    let mut received = 0u64;

    assert_no_alloc(|| {
        for _ in 0..2_100 {
            let mut block = [&mut left[..], &mut right[..]];
            processor.process_block(&mut block, 2, &TransportInfo::playing(45.0, ppq));
            if receiver.poll().is_some() {
                received += 1;
            }
            ppq += 45.0 / 60.0 * BLOCK as f64 / 96_000.0;
        }
    });

    assert!(received >= 3);
    assert_eq!(processor.dispatch_stats().dropped, 0);
}

#[test]
fn port_attach_and_detach_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), SAMPLE_RATE, 2).unwrap();
    let mut port = processor.consumer_port();
    let mut receiver = port.attach().unwrap();

    let mut left = vec![0.5f32; BLOCK];
    let mut right = vec![0.5f32; BLOCK];
    let mut ppq = 0.0;
    let mut received = 0u64;

    assert_no_alloc(|| {
        for _ in 0..1_000 {
            let mut block = [&mut left[..], &mut right[..]];
            processor.process_block(&mut block, 2, &TransportInfo::playing(120.0, ppq));
            if receiver.poll().is_some() {
                received += 1;
            }
            ppq += 120.0 / 60.0 * BLOCK as f64 / SAMPLE_RATE;
        }
    });
    assert!(received > 0);
    assert!(processor.has_consumer());

    port.detach().unwrap();
    assert_no_alloc(|| {
        let mut block = [&mut left[..], &mut right[..]];
        processor.process_block(&mut block, 2, &TransportInfo::playing(120.0, ppq));
    });
    assert!(!processor.has_consumer());
    assert_eq!(port.release_retired(), 1);
}

#[test]
fn very_slow_tempo_alloc_free() {
    let mut processor = BeatProcessor::new(TrackerConfig::default(), SAMPLE_RATE, 2).unwrap();
    let received = play(&mut processor, 400, 1_000.0, |index| {
        if index % 2 == 0 {
            1e-6
        } else {
            120.0
        }
    });
    assert_eq!(processor.capacity(), 24_000);
    assert!(received <= processor.beats_detected());
}
