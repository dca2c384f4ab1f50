//! Sliding-window admission under paused time

use labour_force_fetcher::downloader::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_no_window_exceeds_quota() {
    let limiter = RateLimiter::new(3, Duration::from_secs(10));
    let mut admitted = Vec::new();

    for _ in 0..10 {
        limiter.admit().await;
        admitted.push(Instant::now());
    }

    for pair in admitted.windows(4) {
        assert!(
            pair[3].duration_since(pair[0]) >= Duration::from_secs(10),
            "four admissions inside one window"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_quota() {
    let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
    let start = Instant::now();

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.admit().await;
                Instant::now()
            })
        })
        .collect();

    let mut waits = Vec::new();
    for task in tasks {
        waits.push(task.await.unwrap().duration_since(start));
    }
    waits.sort();

    assert!(waits[1] < Duration::from_secs(1));
    assert!(waits[2] >= Duration::from_secs(60));
    assert!(waits[3] >= Duration::from_secs(60));
    assert_eq!(limiter.in_flight().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_admit_reports_wait() {
    let limiter = RateLimiter::new(1, Duration::from_secs(5));
    assert_eq!(limiter.admit().await, Duration::ZERO);
    assert!(limiter.admit().await >= Duration::from_secs(5));
}
