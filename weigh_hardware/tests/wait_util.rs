use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use weigh_hardware::util::{Readiness, wait_until_low};

#[test]
fn data_line_dropping_low_ends_the_wait() {
    let high = Arc::new(AtomicBool::new(true));
    let high_bg = high.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        high_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_until_low(
        || high.load(Ordering::Relaxed),
        Duration::from_millis(500),
        Duration::from_micros(200),
    );
    assert_eq!(res, Readiness::Ready);
}

#[test]
fn line_already_low_is_ready_without_sleeping() {
    let start = Instant::now();
    let res = wait_until_low(|| false, Duration::from_secs(1), Duration::from_millis(100));
    assert_eq!(res, Readiness::Ready);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn line_stuck_high_reports_not_ready_and_polls_gently() {
    let polls = AtomicUsize::new(0);
    let res = wait_until_low(
        || {
            polls.fetch_add(1, Ordering::Relaxed);
            true
        },
        Duration::from_millis(10),
        Duration::from_millis(1),
    );
    assert_eq!(res, Readiness::NotReady);
    // Sleeping between polls keeps the count far below a busy loop's.
    assert!(polls.load(Ordering::Relaxed) < 100);
}
