mod support;

use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use support::{FakeCall, FakeConfig, FakeOpener};
use vst2_surround_bridge::{AudioBuffer, SharedBridge, SurroundBridge, INTERNAL_CHANNELS};

const MODULE: &str = "/plugins/FakeReverb.so";

fn prepared(opener: &FakeOpener, block_size: usize) -> SurroundBridge {
    let mut bridge = SurroundBridge::builder()
        .module_path(MODULE)
        .chunk_settle(Duration::ZERO)
        .program_settle(Duration::ZERO)
        .build_with_opener(opener.clone());
    bridge.prepare(48_000.0, block_size);
    bridge
}

fn ramp(channels: usize, frames: usize) -> AudioBuffer {
    AudioBuffer::from_channels(
        (0..channels)
            .map(|channel| (0..frames).map(|frame| (channel * 100 + frame) as f32).collect())
            .collect(),
    )
}

#[test]
fn prepare_loads_activates_and_reasserts_the_layout() {
    let opener = FakeOpener::new(FakeConfig::default());
    let bridge = prepared(&opener, 256);

    assert!(bridge.is_loaded());
    assert!(bridge.host_context().is_prepared());
    assert!(!bridge.host_context().is_suspended());
    assert!(bridge.router().capacity() >= 256);
    let calls = opener.calls();
    assert_eq!(
        &calls[calls.len() - 4..],
        &[
            FakeCall::SampleRate(48_000.0),
            FakeCall::BlockSize(256),
            FakeCall::Resume,
            FakeCall::Arrangement {
                accepted: true,
                num_inputs: 6,
                num_outputs: 6
            },
        ]
    );
}

#[test]
fn release_suspends_the_module() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = prepared(&opener, 64);
    bridge.release();
    assert_eq!(opener.calls().last(), Some(&FakeCall::Suspend));
    assert!(bridge.host_context().is_suspended());
    assert!(!bridge.host_context().is_prepared());
}

#[test]
fn audio_passes_through_when_no_module_is_available() {
    let opener = FakeOpener::new(FakeConfig {
        missing_file: true,
        ..FakeConfig::default()
    });
    let mut bridge = prepared(&opener, 64);
    assert!(!bridge.is_loaded());

    let mut buffer = ramp(2, 64);
    let before = buffer.clone();
    bridge.process(&mut buffer);
    assert_eq!(buffer, before);
}

#[test]
fn stereo_host_feeds_the_first_two_module_channels() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = prepared(&opener, 32);

    let mut buffer = ramp(2, 32);
    let before = buffer.clone();
    bridge.process(&mut buffer);

    for channel in 0..2 {
        let expected: Vec<f32> = before[channel].iter().map(|s| s * 0.5).collect();
        assert_eq!(&buffer[channel], expected.as_slice());
    }
    for channel in 2..INTERNAL_CHANNELS {
        assert!(bridge.router().input()[channel][..32].iter().all(|&s| s == 0.0));
    }
    assert!(opener.calls().contains(&FakeCall::Process(32)));
}

#[test]
fn wide_host_keeps_channels_past_the_sixth() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = prepared(&opener, 16);

    let mut buffer = ramp(8, 16);
    let before = buffer.clone();
    bridge.process(&mut buffer);

    for channel in 0..INTERNAL_CHANNELS {
        let expected: Vec<f32> = before[channel].iter().map(|s| s * 0.5).collect();
        assert_eq!(&buffer[channel], expected.as_slice());
    }
    assert_eq!(&buffer[6], &before[6]);
    assert_eq!(&buffer[7], &before[7]);
}

#[test]
fn larger_blocks_grow_the_router() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = prepared(&opener, 64);

    let mut buffer = ramp(6, 1024);
    bridge.process(&mut buffer);
    assert_eq!(bridge.router().capacity(), 1024);
    assert_eq!(buffer[5][1023], (500 + 1023) as f32 * 0.5);

    let mut small = ramp(6, 16);
    bridge.process(&mut small);
    assert_eq!(bridge.router().capacity(), 1024);
}

#[test]
fn faulting_process_leaves_the_block_untouched() {
    let opener = FakeOpener::new(FakeConfig {
        fault_on_process: true,
        ..FakeConfig::default()
    });
    let mut bridge = prepared(&opener, 32);

    let mut buffer = ramp(6, 32);
    let before = buffer.clone();
    bridge.process(&mut buffer);
    bridge.process(&mut buffer);
    assert_eq!(buffer, before);
    assert!(bridge.is_loaded());
    assert_eq!(opener.count(|call| *call == FakeCall::Process(32)), 2);
}

#[test]
fn suspended_module_is_bypassed() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = SurroundBridge::builder()
        .module_path(MODULE)
        .build_with_opener(opener.clone());
    bridge.load(MODULE).unwrap();
    assert!(bridge.host_context().is_suspended());

    let mut buffer = ramp(2, 32);
    let before = buffer.clone();
    bridge.process(&mut buffer);
    assert_eq!(buffer, before);

    bridge.prepare(48_000.0, 32);
    bridge.release();
    bridge.process(&mut buffer);
    assert_eq!(buffer, before);
    assert_eq!(opener.count(|call| matches!(call, FakeCall::Process(_))), 0);
}

#[test]
fn empty_blocks_are_skipped() {
    let opener = FakeOpener::new(FakeConfig::default());
    let mut bridge = prepared(&opener, 32);
    let mut buffer = AudioBuffer::new(2, 0);
    bridge.process(&mut buffer);
    assert_eq!(opener.count(|call| matches!(call, FakeCall::Process(_))), 0);
}

#[test]
fn shared_bridge_skips_blocks_while_the_control_thread_holds_it() {
    let opener = FakeOpener::new(FakeConfig::default());
    let shared = SharedBridge::new(prepared(&opener, 32));

    let mut buffer = ramp(2, 32);
    let before = buffer.clone();
    {
        let _control = shared.lock();
        assert!(!shared.process(&mut buffer));
    }
    assert_eq!(buffer, before);

    let audio = shared.clone();
    let processed = thread::spawn(move || {
        let mut buffer = ramp(2, 32);
        let ran = audio.process(&mut buffer);
        (ran, buffer[1][3])
    })
    .join()
    .unwrap();
    assert_eq!(processed, (true, 103.0 * 0.5));
}

#[test]
fn shared_bridge_round_trips_state() {
    let opener = FakeOpener::new(FakeConfig {
        initial_params: vec![0.7, 0.8, 0.9],
        ..FakeConfig::default()
    });
    let shared = SharedBridge::from(prepared(&opener, 32));

    let saved = shared.save_state().unwrap();
    shared.lock().set_parameter(0, 0.0);
    let report = shared.restore_state(&saved);
    assert!(report.is_clean(), "{:?}", report.skipped);
    assert_eq!(shared.lock().parameter(0), 0.7);
}
