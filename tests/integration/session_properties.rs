//! Session-level behavior across many devices.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use mcam::bridge::mock::MockBridge;
use mcam::device::DeviceManager;
use mcam::error::DeviceError;
use mcam::session::SessionCache;

use crate::common::fixtures::{devices, options, profile, session, session_with, slow_profile};
use crate::common::init_test_logging;

const PRIME_COMMANDS: [&str; 4] = ["KEYCODE_WAKEUP", "KEYCODE_MENU", "am start", "input tap"];

fn serials<T>(outcomes: &[mcam::session::DeviceOutcome<T>]) -> Vec<&str> {
    outcomes.iter().map(|o| o.device.serial.as_str()).collect()
}

// ===== Ordering =====

#[tokio::test(start_paused = true)]
async fn test_capture_has_one_entry_per_device_in_discovery_order() {
    init_test_logging();
    for n in 0..6 {
        let all: Vec<String> = (0..n).rev().map(|i| format!("dev{i:02}")).collect();
        let bridge = Arc::new(MockBridge::new(all.clone()));
        // Stagger finishing order against discovery order.
        for (i, serial) in all.iter().enumerate() {
            bridge.delay_command(serial, "input tap", Duration::from_millis(100 * i as u64));
        }
        let cache = Arc::new(SessionCache::new());

        let discovered = DeviceManager::new(bridge.clone(), Duration::from_secs(2))
            .discover()
            .await
            .unwrap();
        let outcomes = session(&bridge, &cache).capture(&discovered).await;

        assert_eq!(outcomes.len(), n);
        let mut expected: Vec<&str> = all.iter().map(String::as_str).collect();
        expected.sort_unstable();
        assert_eq!(serials(&outcomes), expected);
        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert!(
            outcomes
                .iter()
                .enumerate()
                .all(|(i, o)| o.device.position.index == i)
        );
    }
}

// ===== Cache =====

#[tokio::test(start_paused = true)]
async fn test_second_prime_resends_prime_commands() {
    let bridge = Arc::new(MockBridge::new(["A", "B"]));
    let cache = Arc::new(SessionCache::new());
    let devs = devices(&["A", "B"]);

    session(&bridge, &cache).prime(&devs).await;
    bridge.clear_calls();

    let outcomes = session(&bridge, &cache).prime(&devs).await;
    for outcome in &outcomes {
        assert!(outcome.result.as_ref().unwrap().replaced);
    }
    for serial in ["A", "B"] {
        for command in PRIME_COMMANDS {
            assert_eq!(bridge.count_matching(serial, command), 1, "{serial}: {command}");
        }
    }
    assert!(cache.contains("A") && cache.contains("B"));
}

#[tokio::test(start_paused = true)]
async fn test_capture_after_prime_consumes_cache() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let cache = Arc::new(SessionCache::new());
    let devs = devices(&["A"]);

    session(&bridge, &cache).prime(&devs).await;
    assert!(cache.contains("A"));
    bridge.clear_calls();

    let outcomes = session(&bridge, &cache).capture(&devs).await;
    assert!(outcomes[0].is_ok());
    for command in PRIME_COMMANDS {
        bridge.assert_no_command("A", command);
    }
    assert!(!cache.contains("A"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_captures_share_one_cached_machine() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let cache = Arc::new(SessionCache::new());
    let devs = devices(&["A"]);

    session(&bridge, &cache).prime(&devs).await;
    bridge.clear_calls();

    let first = session(&bridge, &cache);
    let second = session(&bridge, &cache);
    let (a, b) = tokio::join!(first.capture(&devs), second.capture(&devs));

    assert!(a[0].is_ok());
    assert!(b[0].is_ok());
    // Exactly one of the two sessions had to prime from scratch.
    assert_eq!(bridge.count_matching("A", "KEYCODE_WAKEUP"), 1);
    assert_eq!(bridge.count_matching("A", "am start"), 1);
    assert!(cache.is_empty());
}

// ===== Isolation =====

#[tokio::test(start_paused = true)]
async fn test_prime_timeout_does_not_delay_siblings() {
    let bridge = Arc::new(MockBridge::new(["A", "B", "C"]));
    bridge.hang_command("B", "am start");
    let cache = Arc::new(SessionCache::new());
    let devs = devices(&["A", "B", "C"]);

    let started = Instant::now();
    let outcomes = session(&bridge, &cache).prime(&devs).await;

    assert!(outcomes[0].is_ok());
    assert!(outcomes[2].is_ok());
    let err = outcomes[1].result.as_ref().unwrap_err();
    assert_eq!(err.kind(), "device_timeout");
    // Bounded by the 2s command timeout, not the 10s session deadline.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(cache.serials(), vec!["A", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_capture_timeout_is_isolated() {
    let bridge = Arc::new(MockBridge::new(["A", "B"]));
    bridge.hang_command("A", "pull ");
    let cache = Arc::new(SessionCache::new());

    let outcomes = session(&bridge, &cache).capture(&devices(&["A", "B"])).await;
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), "device_timeout");
    assert!(outcomes[1].is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_session_deadline_shorter_than_delays() {
    let bridge = Arc::new(MockBridge::new(["A", "B"]));
    let cache = Arc::new(SessionCache::new());
    // A gets real delays; B none. Both share one deadline.
    let fast = devices(&["B"]);
    let slow = devices(&["A"]);

    let deadline = Duration::from_secs(1);
    let slow_session = session_with(
        &bridge,
        &cache,
        slow_profile(),
        options(deadline, Duration::from_secs(5)),
    );
    let fast_session = session_with(
        &bridge,
        &cache,
        profile(),
        options(deadline, Duration::from_secs(5)),
    );

    let started = Instant::now();
    let (slow_out, fast_out) =
        tokio::join!(slow_session.capture(&slow), fast_session.capture(&fast));

    assert_eq!(slow_out[0].result.as_ref().unwrap_err(), &DeviceError::SessionTimeout);
    assert!(fast_out[0].is_ok());
    assert!(started.elapsed() <= Duration::from_millis(1100));
    assert!(!cache.contains("A"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_completed_outcomes() {
    let bridge = Arc::new(MockBridge::new(["A", "B", "C"]));
    bridge.delay_command("C", "am start", Duration::from_secs(4));
    let cache = Arc::new(SessionCache::new());
    let short = session_with(
        &bridge,
        &cache,
        profile(),
        options(Duration::from_secs(3), Duration::from_secs(5)),
    );

    let outcomes = short.prime(&devices(&["A", "B", "C"])).await;
    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].is_ok());
    assert_eq!(outcomes[2].result.as_ref().unwrap_err().kind(), "session_timeout");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abort_still_releases_camera() {
    let bridge = Arc::new(MockBridge::new(["A", "B"]));
    bridge.delay_command("B", "KEYCODE_VOLUME_DOWN", Duration::from_secs(4));
    let cache = Arc::new(SessionCache::new());
    let short = session_with(
        &bridge,
        &cache,
        profile(),
        options(Duration::from_secs(3), Duration::from_secs(5)),
    );

    let outcomes = short.capture(&devices(&["A", "B"])).await;
    assert!(outcomes[0].is_ok());
    assert_eq!(outcomes[1].result.as_ref().unwrap_err().kind(), "session_timeout");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(bridge.count_matching("A", "KEYCODE_POWER"), 1);
    assert_eq!(bridge.count_matching("B", "KEYCODE_POWER"), 1);
}

// ===== Scenarios =====

#[tokio::test(start_paused = true)]
async fn test_scenario_prime_then_capture_three_devices() {
    let bridge = Arc::new(MockBridge::new(["C", "A", "B"]));
    let cache = Arc::new(SessionCache::new());
    let devs = DeviceManager::new(bridge.clone(), Duration::from_secs(2))
        .discover()
        .await
        .unwrap();

    let primed = session(&bridge, &cache).prime(&devs).await;
    assert!(primed.iter().all(|o| o.is_ok()));
    assert_eq!(cache.serials(), vec!["A", "B", "C"]);

    let captured = session(&bridge, &cache).capture(&devs).await;
    assert_eq!(serials(&captured), vec!["A", "B", "C"]);
    for outcome in &captured {
        let image = outcome.result.as_ref().unwrap();
        assert_eq!(image.serial, outcome.device.serial);
        assert_eq!(image.format, "png");
        assert!(!image.bytes.is_empty());
    }
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_launch_failure_yields_not_primed() {
    let bridge = Arc::new(MockBridge::new(["D"]));
    bridge.fail_command("D", "am start", "Error: Activity class does not exist");
    let cache = Arc::new(SessionCache::new());
    let devs = devices(&["D"]);

    let primed = session(&bridge, &cache).prime(&devs).await;
    assert_eq!(primed[0].result.as_ref().unwrap_err().kind(), "command_failed");
    assert!(cache.is_empty());

    bridge.clear_calls();
    let captured = session(&bridge, &cache).capture(&devs).await;
    assert_eq!(captured.len(), 1);
    match captured[0].result.as_ref().unwrap_err() {
        DeviceError::NotPrimed { cause } => assert_eq!(cause.kind(), "command_failed"),
        other => panic!("expected not_primed, got {other:?}"),
    }
    for command in ["VOLUME_DOWN", "ls -t", "pull ", "KEYCODE_POWER"] {
        bridge.assert_no_command("D", command);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pull_failure_is_distinct_from_command_failure() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    bridge.fail_command("A", "pull ", "remote object does not exist");
    let cache = Arc::new(SessionCache::new());

    let outcomes = session(&bridge, &cache).capture(&devices(&["A"])).await;
    assert_eq!(outcomes[0].result.as_ref().unwrap_err().kind(), "pull_failed");
    // The shutter fired before retrieval failed.
    assert_eq!(bridge.count_matching("A", "VOLUME_DOWN"), 1);
}
