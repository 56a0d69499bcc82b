//! Device concurrency: cancel-and-replace, preemption and shutdown,
//! driven through the command processor the way clients drive it.

use std::sync::Arc;
use std::time::Duration;

use iotctl::adapters::sim_hal::{HalCall, SimHal};
use iotctl::app::ports::Phase;
use iotctl::config::SystemConfig;
use iotctl::drivers::buzzer::MELODY;
use iotctl::error::DeviceKind;
use iotctl::pins;

use crate::harness::{Rig, fast_config, wait_until};

const SETTLE: Duration = Duration::from_secs(3);

fn phase(rig: &Rig, kind: DeviceKind) -> Phase {
    rig.table.device(kind).expect("device bound").phase()
}

fn status(rig: &Rig, kind: DeviceKind) -> String {
    rig.table.device(kind).expect("device bound").status()
}

fn segment_levels(hal: &SimHal) -> Vec<Option<bool>> {
    hal.levels(&pins::SEGMENT_GPIOS)
}

#[test]
fn rapid_auto_starts_leave_one_poller() {
    let rig = Rig::new();
    rig.hal.set_light(250);
    assert!(rig.run("CDS_AUTO_START").starts_with("OK"));
    assert!(rig.run("CDS_AUTO_START").starts_with("OK"));
    assert_eq!(phase(&rig, DeviceKind::Cds), Phase::Active);

    // A single poller samples once per interval; two would double the rate.
    std::thread::sleep(Duration::from_millis(30));
    rig.hal.clear_calls();
    std::thread::sleep(Duration::from_millis(200));
    let samples = rig
        .hal
        .calls()
        .iter()
        .filter(|c| matches!(c, HalCall::I2cRead { .. }))
        .count();
    assert!((5..=13).contains(&samples), "unexpected sample count {}", samples);

    assert!(rig.run("CDS_AUTO_STOP").starts_with("OK"));
    assert_eq!(phase(&rig, DeviceKind::Cds), Phase::Idle);
}

#[test]
fn display_after_countdown_shows_digit_and_stays() {
    let rig = Rig::new();
    assert_eq!(rig.run("SEGMENT_COUNTDOWN 9"), "OK: SEGMENT countdown from 9 started");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.run("SEGMENT_DISPLAY 3"), "OK: SEGMENT showing 3");
    assert_eq!(phase(&rig, DeviceKind::Segment), Phase::Idle);

    let three = vec![Some(false), Some(false), Some(true), Some(true)];
    assert_eq!(segment_levels(&rig.hal), three);
    // Several ticks later no stale countdown digit has overwritten it.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(segment_levels(&rig.hal), three);
}

#[test]
fn countdown_restart_replaces_previous() {
    let rig = Rig::new();
    rig.run("SEGMENT_COUNTDOWN 9");
    rig.run("SEGMENT_COUNTDOWN 2");
    assert!(wait_until(SETTLE, || phase(&rig, DeviceKind::Segment) == Phase::Idle));
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4], "blank after alarm");
    // The alarm used the buzzer and silenced it afterwards.
    assert!(rig.hal.tone_history(pins::BUZZER_GPIO).contains(&MELODY[0].hz));
    assert_eq!(rig.hal.tone(pins::BUZZER_GPIO), Some(0));
}

#[test]
fn segment_stop_blanks_after_join() {
    let rig = Rig::new();
    rig.run("SEGMENT_COUNTDOWN 5");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.run("SEGMENT_STOP"), "OK: SEGMENT countdown stopped");
    assert_eq!(phase(&rig, DeviceKind::Segment), Phase::Idle);
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
}

#[test]
fn buzzer_play_twice_restarts_from_first_note() {
    let rig = Rig::new();
    rig.run("BUZZER_PLAY");
    // Let the melody advance past its opening notes.
    std::thread::sleep(Duration::from_millis(200));
    rig.hal.clear_calls();
    rig.run("BUZZER_PLAY");
    std::thread::sleep(Duration::from_millis(10));

    // Still inside the first note of the new melody.
    let history = rig.hal.tone_history(pins::BUZZER_GPIO);
    assert_eq!(history.last().copied(), Some(MELODY[0].hz));
    assert_eq!(phase(&rig, DeviceKind::Buzzer), Phase::Active);
    assert_eq!(rig.run("BUZZER_STOP"), "OK: BUZZER stopped");
    assert_eq!(rig.hal.tone(pins::BUZZER_GPIO), Some(0));
}

#[test]
fn auto_start_stop_leaves_actuator_off() {
    let rig = Rig::new();
    rig.hal.set_light(240);
    rig.run("CDS_AUTO_START");
    assert!(wait_until(SETTLE, || rig.hal.pin(pins::AUTO_LED_GPIO) == Some(true)));
    rig.run("CDS_AUTO_STOP");
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(rig.hal.pin(pins::AUTO_LED_GPIO), Some(false));
    assert!(rig.run("CDS_GET_STATUS").starts_with("OK: CDS: IDLE"));
}

#[test]
fn read_during_auto_mode_is_consistent() {
    let rig = Rig::new();
    rig.hal.set_light(10);
    rig.run("CDS_AUTO_START");
    for _ in 0..20 {
        assert_eq!(rig.run("CDS_READ"), "OK: light value 10 (bright)");
    }
    assert_eq!(rig.hal.pin(pins::AUTO_LED_GPIO), Some(false));
}

#[test]
fn countdown_without_buzzer_still_blanks() {
    let hal = Arc::new(SimHal::new());
    hal.fail_setup(DeviceKind::Buzzer);
    let rig = Rig::with(hal, &fast_config());
    assert_eq!(rig.run("BUZZER_PLAY"), "ERROR: buzzer capability unavailable");
    rig.run("SEGMENT_COUNTDOWN 1");
    assert!(wait_until(SETTLE, || phase(&rig, DeviceKind::Segment) == Phase::Idle));
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
}

#[test]
fn shutdown_stops_background_work() {
    let rig = Rig::new();
    rig.run("BUZZER_PLAY");
    rig.run("SEGMENT_COUNTDOWN 9");
    rig.run("CDS_AUTO_START");
    rig.shutdown.trigger();
    for kind in [DeviceKind::Buzzer, DeviceKind::Segment, DeviceKind::Cds] {
        assert!(wait_until(SETTLE, || phase(&rig, kind) == Phase::Idle), "{} still active", kind);
    }
    rig.table.unload();
    assert_eq!(rig.table.available_count(), 0);
}

#[test]
fn commands_from_many_threads_are_serialized_per_device() {
    let rig = Arc::new(Rig::new());
    let workers: Vec<_> = (0..4)
        .map(|i| {
            let rig = Arc::clone(&rig);
            std::thread::spawn(move || {
                for n in 0..10 {
                    let digit = (i + n) % 10;
                    rig.run(&format!("SEGMENT_DISPLAY {}", digit));
                    rig.run("BUZZER_PLAY");
                    rig.run(&format!("LED_BRIGHTNESS {}", n % 3));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(phase(&rig, DeviceKind::Buzzer), Phase::Active);
    rig.run("ALL_OFF");
    assert_eq!(phase(&rig, DeviceKind::Buzzer), Phase::Idle);
    assert_eq!(rig.hal.pwm(pins::LED_PWM_GPIO), Some(0));
}

// ── Alarm and a user melody ───────────────────────────────────

#[test]
fn buzzer_play_during_alarm_keeps_playing() {
    let config = SystemConfig {
        alarm_duration_ms: 300,
        melody_note_ms: 100,
        ..fast_config()
    };
    let rig = Rig::with(Arc::new(SimHal::new()), &config);
    assert_eq!(rig.run("SEGMENT_COUNTDOWN 1"), "OK: SEGMENT countdown from 1 started");
    assert!(wait_until(SETTLE, || phase(&rig, DeviceKind::Buzzer) == Phase::Active));

    // The alarm is sounding; a client takes over the buzzer.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(rig.run("BUZZER_PLAY"), "OK: BUZZER playing");

    // Well past the end of the alarm, the newer melody is untouched.
    assert!(wait_until(SETTLE, || phase(&rig, DeviceKind::Segment) == Phase::Idle));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(status(&rig, DeviceKind::Buzzer), "BUZZER: PLAYING");
    assert_ne!(rig.hal.tone(pins::BUZZER_GPIO), Some(0));
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
}

#[test]
fn cancelled_countdown_sounds_no_alarm() {
    let rig = Rig::new();
    rig.run("SEGMENT_COUNTDOWN 1");
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(rig.run("SEGMENT_STOP"), "OK: SEGMENT countdown stopped");
    std::thread::sleep(Duration::from_millis(150));
    assert!(rig.hal.tone_history(pins::BUZZER_GPIO).iter().all(|hz| *hz == 0));
}

// ── Workers that miss the join bound ──────────────────────────

/// Workers check for cancellation far less often than callers wait.
fn stubborn_rig() -> Rig {
    let config = SystemConfig {
        countdown_tick_ms: 1000,
        melody_note_ms: 1000,
        auto_poll_interval_ms: 1000,
        cancel_poll_ms: 200,
        join_timeout_ms: 1,
        ..fast_config()
    };
    Rig::with(Arc::new(SimHal::new()), &config)
}

#[test]
fn segment_display_over_stuck_countdown_resets() {
    let rig = stubborn_rig();
    rig.run("SEGMENT_COUNTDOWN 9");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        rig.run("SEGMENT_DISPLAY 3"),
        "ERROR: segment busy: previous task did not stop in time, state reset"
    );
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
    assert_eq!(phase(&rig, DeviceKind::Segment), Phase::Idle);

    // The detached worker never writes again.
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
    assert_eq!(status(&rig, DeviceKind::Segment), "SEGMENT: IDLE (showing blank)");
}

#[test]
fn segment_stop_over_stuck_countdown_resets() {
    let rig = stubborn_rig();
    rig.run("SEGMENT_COUNTDOWN 5");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        rig.run("SEGMENT_STOP"),
        "ERROR: segment busy: previous task did not stop in time, state reset"
    );
    assert_eq!(segment_levels(&rig.hal), vec![Some(true); 4]);
    assert_eq!(phase(&rig, DeviceKind::Segment), Phase::Idle);
}

#[test]
fn buzzer_over_stuck_melody_goes_silent() {
    let rig = stubborn_rig();
    rig.run("BUZZER_PLAY");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        rig.run("BUZZER_PLAY"),
        "ERROR: buzzer busy: previous task did not stop in time, state reset"
    );
    assert_eq!(rig.hal.tone(pins::BUZZER_GPIO), Some(0));
    assert_eq!(phase(&rig, DeviceKind::Buzzer), Phase::Idle);

    rig.run("BUZZER_PLAY");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(
        rig.run("BUZZER_STOP"),
        "ERROR: buzzer busy: previous task did not stop in time, state reset"
    );
    assert_eq!(rig.hal.tone(pins::BUZZER_GPIO), Some(0));
    assert_eq!(phase(&rig, DeviceKind::Buzzer), Phase::Idle);
}

#[test]
fn cds_over_stuck_poller_turns_actuator_off() {
    let rig = stubborn_rig();
    rig.hal.set_light(250);
    rig.run("CDS_AUTO_START");
    assert!(wait_until(SETTLE, || rig.hal.pin(pins::AUTO_LED_GPIO) == Some(true)));
    assert_eq!(
        rig.run("CDS_AUTO_START"),
        "ERROR: cds busy: previous task did not stop in time, state reset"
    );
    assert_eq!(rig.hal.pin(pins::AUTO_LED_GPIO), Some(false));
    assert_eq!(phase(&rig, DeviceKind::Cds), Phase::Idle);

    rig.run("CDS_AUTO_START");
    assert!(wait_until(SETTLE, || rig.hal.pin(pins::AUTO_LED_GPIO) == Some(true)));
    assert_eq!(
        rig.run("CDS_AUTO_STOP"),
        "ERROR: cds busy: previous task did not stop in time, state reset"
    );
    assert_eq!(rig.hal.pin(pins::AUTO_LED_GPIO), Some(false));
    assert_eq!(phase(&rig, DeviceKind::Cds), Phase::Idle);
}
