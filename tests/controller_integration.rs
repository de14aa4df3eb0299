//! Integration tests for the hardware-backed controller.
//!
//! Every test drives a real `LedController` (bus worker thread, animation
//! tasks) against the instrumented `RecordingDriver` and inspects what the
//! "hardware" actually saw.

use std::sync::Arc;
use std::time::Duration;

use ledstrip::{
    wheel, Animation, ControllerOptions, ControllerState, LedControl, LedController, LedError,
    Outcome, Rgb,
};
use ledstrip_driver::{DriverCall, RecordingDriver, StripRecorder};
use tokio::time::{sleep, Instant};

const MS: Duration = Duration::from_millis(1);

async fn controller(len: usize) -> (LedController, StripRecorder) {
    controller_with(len, ControllerOptions::default()).await
}

async fn controller_with(len: usize, options: ControllerOptions) -> (LedController, StripRecorder) {
    let (driver, recorder) = RecordingDriver::new(len);
    let controller = LedController::new(driver, options).await.unwrap();
    (controller, recorder)
}

fn rainbow_frame(len: usize, j: usize) -> Vec<Rgb> {
    (0..len).map(|i| wheel(((i + j) & 255) as u8)).collect()
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

// ── Construction ──

#[tokio::test(flavor = "multi_thread")]
async fn construction_applies_brightness_without_showing() {
    let options = ControllerOptions {
        brightness: 100,
        ..ControllerOptions::default()
    };
    let (controller, recorder) = controller_with(8, options).await;

    assert_eq!(recorder.brightness(), 100);
    assert_eq!(recorder.show_count(), 0);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(controller.len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_strip_is_rejected() {
    let (driver, _recorder) = RecordingDriver::new(0);
    let err = LedController::new(driver, ControllerOptions::default())
        .await
        .err()
        .unwrap();
    assert!(err.is_invalid_command());
}

// ── Single frames ──

#[tokio::test(flavor = "multi_thread")]
async fn set_all_and_off_write_one_frame_each() {
    let (controller, recorder) = controller(8).await;

    assert_eq!(controller.set_all(Rgb::RED).await.unwrap(), Outcome::Completed);
    assert_eq!(controller.off().await.unwrap(), Outcome::Completed);

    let frames = recorder.frames();
    assert_eq!(frames, vec![vec![Rgb::RED; 8], vec![Rgb::BLACK; 8]]);
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn power_budget_dims_bus_copy_only() {
    let options = ControllerOptions {
        power_budget_ma: 100,
        ..ControllerOptions::default()
    };
    let (controller, recorder) = controller_with(8, options).await;
    controller.set_all(Rgb::WHITE).await.unwrap();

    let shown = recorder.last_frame().unwrap();
    assert!(shown.iter().all(|c| c.r < 255 && c.r == c.g && c.g == c.b));
    assert!(ledstrip::frame::estimate_current_ma(&shown) <= 100.0);
    assert_eq!(controller.frame(), vec![Rgb::WHITE; 8]);
}

// ── Colour wipe ──

#[tokio::test(flavor = "multi_thread")]
async fn color_wipe_shows_once_per_pixel() {
    let (controller, recorder) = controller(8).await;
    controller.set_all(Rgb::RED).await.unwrap();

    let start = Instant::now();
    let outcome = controller
        .color_wipe(Rgb::BLUE, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);
    // Seven waits between eight pixels
    assert!(start.elapsed() >= Duration::from_millis(70));

    let frames = recorder.frames();
    assert_eq!(frames.len(), 1 + 8);
    for (i, frame) in frames[1..].iter().enumerate() {
        assert!(frame[..=i].iter().all(|c| *c == Rgb::BLUE), "frame {i}");
        assert!(frame[i + 1..].iter().all(|c| *c == Rgb::RED), "frame {i}");
    }
    assert_eq!(recorder.partial_frames(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn superseded_wipe_resolves_cancelled() {
    let (controller, recorder) = controller(8).await;

    let wipe = controller
        .start(Animation::ColorWipe {
            color: Rgb::GREEN,
            delay: Duration::from_millis(20),
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(30)).await;
    controller.set_all(Rgb::RED).await.unwrap();

    assert_eq!(wipe.wait().await.unwrap(), Outcome::Cancelled);
    let frames = recorder.frames();
    assert!(frames.len() < 1 + 8);
    assert_eq!(frames.last().unwrap(), &vec![Rgb::RED; 8]);
}

// ── Rainbows ──

#[tokio::test(flavor = "multi_thread")]
async fn set_all_supersedes_rainbow() {
    let (controller, recorder) = controller(8).await;

    let rainbow = controller.rainbow(MS).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    controller.set_all(Rgb::RED).await.unwrap();
    let shows = recorder.show_count();

    sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.show_count(), shows, "frame written after set_all");

    let frames = recorder.frames();
    let (last, rainbow_frames) = frames.split_last().unwrap();
    assert_eq!(last, &vec![Rgb::RED; 8]);
    assert!(!rainbow_frames.is_empty());
    for (j, frame) in rainbow_frames.iter().enumerate() {
        assert_eq!(frame, &rainbow_frame(8, j));
    }

    assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_rainbow_never_leaves_partial_frame() {
    let (controller, recorder) = controller(8).await;

    let rainbow = controller.rainbow(MS).await.unwrap();
    sleep(Duration::from_millis(37)).await;
    controller.stop_animation().await.unwrap();
    let shows = recorder.show_count();

    assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(recorder.partial_frames(), 0);
    for (j, frame) in recorder.frames().iter().enumerate() {
        assert_eq!(frame, &rainbow_frame(8, j));
    }

    // The last frame stays on the strip
    sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.show_count(), shows);
    assert_eq!(recorder.pixels(), rainbow_frame(8, shows - 1));
}

#[tokio::test(flavor = "multi_thread")]
async fn relaunched_rainbow_starts_from_first_frame() {
    let (controller, recorder) = controller(4).await;

    controller.rainbow(MS).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    controller.set_all(Rgb::BLUE).await.unwrap();
    let before = recorder.show_count();

    controller.rainbow(Duration::from_secs(1)).await.unwrap();
    wait_until("first frame", || recorder.show_count() > before).await;
    assert_eq!(recorder.frames()[before], rainbow_frame(4, 0));
}

#[tokio::test(flavor = "multi_thread")]
async fn rainbow_cycle_runs_256_frames_per_cycle() {
    let (controller, recorder) = controller(8).await;

    let handle = controller.rainbow_cycle(Duration::ZERO, 1).await.unwrap();
    assert_eq!(handle.wait().await.unwrap(), Outcome::Completed);

    assert_eq!(recorder.show_count(), 256);
    let frames = recorder.frames();
    assert_eq!(frames[0][1], wheel(32));
    assert_eq!(frames[255][0], wheel(255));
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn pulsed_wipe_alternates_until_stopped() {
    let (controller, recorder) = controller(3).await;

    let pulse = controller.pulsed_wipe(Rgb::GREEN, MS).await.unwrap();
    wait_until("two wipes", || recorder.show_count() >= 6).await;
    controller.stop_animation().await.unwrap();

    assert_eq!(pulse.wait().await.unwrap(), Outcome::Cancelled);
    let frames = recorder.frames();
    assert_eq!(frames[2], vec![Rgb::GREEN; 3]);
    assert_eq!(frames[5], vec![Rgb::BLACK; 3]);
}

// ── Brightness ──

#[tokio::test(flavor = "multi_thread")]
async fn brightness_reshows_without_cancelling() {
    let (controller, recorder) = controller(8).await;

    let rainbow = controller.rainbow(Duration::from_millis(5)).await.unwrap();
    controller.set_brightness(32).await.unwrap();

    assert_eq!(recorder.brightness(), 32);
    assert!(!rainbow.is_finished());
    assert!(matches!(
        controller.state(),
        ControllerState::Running {
            animation: "rainbow",
            ..
        }
    ));

    let calls = recorder.calls();
    let pos = calls
        .iter()
        .position(|c| *c == DriverCall::SetBrightness(32))
        .unwrap();
    assert_eq!(calls[pos + 1], DriverCall::Show);

    controller.close().await.unwrap();
    assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
}

// ── Invalid commands ──

#[tokio::test(flavor = "multi_thread")]
async fn invalid_parameters_are_rejected_without_side_effects() {
    let (controller, recorder) = controller(8).await;
    controller.set_all(Rgb::RED).await.unwrap();

    let err = controller
        .rainbow_cycle(MS, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedError::InvalidCommand(_)));

    let err = controller
        .color_wipe(Rgb::BLUE, Duration::from_secs(61))
        .await
        .unwrap_err();
    assert!(err.is_invalid_command());

    assert_eq!(recorder.show_count(), 1);
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_command_leaves_running_animation_alone() {
    let (controller, recorder) = controller(8).await;
    let rainbow = controller.rainbow(MS).await.unwrap();
    wait_until("rainbow frames", || recorder.show_count() >= 2).await;

    assert!(controller
        .rainbow_cycle(MS, 0)
        .await
        .unwrap_err()
        .is_invalid_command());
    assert!(controller
        .color_wipe(Rgb::BLUE, Duration::from_secs(61))
        .await
        .unwrap_err()
        .is_invalid_command());

    assert!(!rainbow.is_finished());
    assert!(matches!(
        controller.state(),
        ControllerState::Running {
            animation: "rainbow",
            ..
        }
    ));
    let shown = recorder.show_count();
    wait_until("rainbow to keep running", || recorder.show_count() > shown + 2).await;

    controller.close().await.unwrap();
    assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
}

// ── Hardware faults ──

#[tokio::test(flavor = "multi_thread")]
async fn hardware_fault_returns_to_idle_and_recovers() {
    let (controller, recorder) = controller(8).await;

    recorder.fail_next_shows(1);
    let err = controller.set_all(Rgb::RED).await.unwrap_err();
    assert!(err.is_hardware_fault());
    assert_eq!(controller.state(), ControllerState::Idle);

    assert_eq!(controller.set_all(Rgb::GREEN).await.unwrap(), Outcome::Completed);
    assert_eq!(recorder.last_frame().unwrap(), vec![Rgb::GREEN; 8]);
    assert_eq!(recorder.release_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn fault_mid_rainbow_ends_the_animation() {
    let (controller, recorder) = controller(8).await;

    let rainbow = controller.rainbow(MS).await.unwrap();
    wait_until("rainbow frames", || recorder.show_count() >= 3).await;
    recorder.fail_next_shows(1);

    assert!(rainbow.wait().await.unwrap_err().is_hardware_fault());
    assert_eq!(controller.state(), ControllerState::Idle);

    let shows = recorder.show_count();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(recorder.show_count(), shows, "no retry after a fault");
}

// ── Close ──

#[tokio::test(flavor = "multi_thread")]
async fn close_blanks_and_releases_exactly_once() {
    let (controller, recorder) = controller(8).await;
    controller.set_all(Rgb::GREEN).await.unwrap();

    controller.close().await.unwrap();
    controller.close().await.unwrap();

    assert_eq!(controller.state(), ControllerState::Closed);
    assert_eq!(recorder.release_count(), 1);
    assert_eq!(recorder.last_frame().unwrap(), vec![Rgb::BLACK; 8]);
    assert_eq!(recorder.pixels(), vec![Rgb::BLACK; 8]);
}

#[tokio::test(flavor = "multi_thread")]
async fn close_cancels_running_animation() {
    let (controller, recorder) = controller(8).await;

    let rainbow = controller.rainbow(MS).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    controller.close().await.unwrap();

    assert_eq!(rainbow.wait().await.unwrap(), Outcome::Cancelled);
    assert_eq!(recorder.last_frame().unwrap(), vec![Rgb::BLACK; 8]);
    assert_eq!(recorder.partial_frames(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_after_close() {
    let (controller, recorder) = controller(8).await;
    controller.close().await.unwrap();

    assert!(matches!(controller.rainbow(MS).await, Err(LedError::Closed)));
    assert!(controller
        .set_all(Rgb::RED)
        .await
        .unwrap_err()
        .is_invalid_command());
    assert!(matches!(
        controller.set_brightness(10).await,
        Err(LedError::Closed)
    ));
    assert!(controller.off().await.is_ok());
    assert!(controller.stop_animation().await.is_ok());

    assert_eq!(recorder.calls_after_release(), 0);
    assert_eq!(recorder.show_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fault_during_close_still_releases() {
    let (controller, recorder) = controller(8).await;
    controller.set_all(Rgb::RED).await.unwrap();

    recorder.fail_next_shows(1);
    assert!(controller.close().await.unwrap_err().is_hardware_fault());
    assert_eq!(controller.state(), ControllerState::Closed);
    assert_eq!(recorder.release_count(), 1);

    controller.close().await.unwrap();
    assert_eq!(recorder.release_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_controller_releases_strip() {
    let (controller, recorder) = controller(8).await;
    controller.rainbow(MS).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    drop(controller);

    wait_until("release", || recorder.is_released()).await;
    assert_eq!(recorder.release_count(), 1);
    assert_eq!(recorder.last_frame().unwrap(), vec![Rgb::BLACK; 8]);
}

// ── Concurrency ──

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_never_overlap_on_the_bus() {
    let (driver, recorder) = RecordingDriver::new(8);
    let driver = driver.with_show_latency(Duration::from_micros(300));
    let controller: Arc<dyn LedControl> = Arc::new(
        LedController::new(driver, ControllerOptions::default())
            .await
            .unwrap(),
    );

    let tasks = (0..8).map(|n| {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            for round in 0..5 {
                let color = Rgb::new(n * 30, round * 40, 0);
                let result = match (n + round) % 4 {
                    0 => controller.set_all(color).await.map(|_| ()),
                    1 => controller.color_wipe(color, MS).await.map(|_| ()),
                    2 => controller.rainbow(MS).await.map(|_| ()),
                    _ => controller.pulsed_wipe(color, MS).await.map(|_| ()),
                };
                result.unwrap();
                sleep(Duration::from_millis(2)).await;
            }
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }
    controller.close().await.unwrap();

    assert_eq!(recorder.overlapping_calls(), 0);
    assert_eq!(recorder.partial_frames(), 0);
    assert_eq!(recorder.release_count(), 1);
    assert_eq!(recorder.last_frame().unwrap(), vec![Rgb::BLACK; 8]);
}

#[tokio::test(flavor = "multi_thread")]
async fn commands_apply_in_submission_order() {
    let (controller, recorder) = controller(4).await;
    let colors = [Rgb::RED, Rgb::GREEN, Rgb::BLUE, Rgb::WHITE];

    for color in colors {
        controller.set_all(color).await.unwrap();
    }

    let frames: Vec<Rgb> = recorder.frames().iter().map(|f| f[0]).collect();
    assert_eq!(frames, colors);
}
