//! Acquisition service tests against the mock bus driver

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use hums_can::driver::mock::{DriverEvent, MockBusDriver};
use hums_can::{
    capture_log_path, AcquisitionConfig, BusAcquisitionService, DiagnosticRequest, RequestFrame,
};
use hums_core::FixedClock;
use tempfile::TempDir;

fn config(dir: &TempDir) -> AcquisitionConfig {
    let mut config = AcquisitionConfig::new("can0", dir.path().join("can_logs"));
    config.device_id = "HUMS-0042".to_string();
    config.housekeeping_interval = Duration::from_millis(20);
    config.stop_timeout = Duration::from_secs(2);
    config
}

fn service(
    config: AcquisitionConfig,
    driver: &Arc<MockBusDriver>,
    clock: &Arc<FixedClock>,
) -> BusAcquisitionService {
    BusAcquisitionService::with_clock(config, driver.clone(), clock.clone())
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn captures_started(driver: &MockBusDriver) -> usize {
    driver.count(|e| matches!(e, DriverEvent::CaptureStarted { .. }))
}

#[tokio::test]
async fn test_session_writes_header_and_capture() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let traffic = "(1718000000.000000) can0 7E8#0441050000000000";
    driver.set_capture_traffic(vec![traffic.to_string()]);
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 30, 5));
    let config = config(&dir);
    let log_path = capture_log_path(&config.capture_dir, date(2024, 6, 10));
    let service = service(config, &driver, &clock);

    service.start().await;
    assert!(service.is_running());
    assert!(wait_until(|| captures_started(&driver) == 1).await);

    service.stop().await;
    assert!(!service.is_running());

    let content = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, vec!["20240610_083005 HUMS-0042", traffic]);

    let events = driver.events();
    assert_eq!(
        events.first(),
        Some(&DriverEvent::BringUp {
            interface: "can0".to_string(),
            bitrate: 500_000
        })
    );
    assert_eq!(
        &events[events.len() - 2..],
        &[
            DriverEvent::CaptureStopped,
            DriverEvent::BringDown {
                interface: "can0".to_string()
            }
        ]
    );
}

#[tokio::test]
async fn test_bring_up_failure_aborts_session() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    driver.set_fail_bring_up(true);
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let config = config(&dir);
    let capture_dir = config.capture_dir.clone();
    let service = service(config, &driver, &clock);

    service.start().await;
    assert!(wait_until(|| !service.is_running()).await);

    assert!(driver.events().is_empty());
    assert!(!capture_dir.exists());

    // stop after a failed start is harmless
    service.stop().await;
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let service = service(config(&dir), &driver, &clock);

    service.stop().await;

    service.start().await;
    service.start().await;
    assert!(wait_until(|| captures_started(&driver) == 1).await);

    service.stop().await;
    service.stop().await;

    assert_eq!(
        driver.count(|e| matches!(e, DriverEvent::BringUp { .. })),
        1
    );
    assert_eq!(
        driver.count(|e| matches!(e, DriverEvent::BringDown { .. })),
        1
    );
}

#[tokio::test]
async fn test_table_requests_are_transmitted() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let periodic = RequestFrame::new(0x7DF, vec![0x02, 0x01, 0x0C]);
    let one_shot = RequestFrame::new(0x7DF, vec![0x02, 0x01, 0xA6]);

    let mut config = config(&dir);
    config.requests = vec![
        DiagnosticRequest::periodic(periodic.clone(), Duration::ZERO, ms(20)),
        DiagnosticRequest::one_shot(one_shot.clone(), ms(30)),
    ];
    let service = service(config, &driver, &clock);

    service.start().await;
    let periodic_sent = || {
        let sent = driver.sent_frames();
        sent.iter().filter(|f| **f == periodic).count()
    };
    assert!(wait_until(|| periodic_sent() >= 3).await);
    service.stop().await;

    let sent = driver.sent_frames();
    assert_eq!(sent.iter().filter(|f| **f == one_shot).count(), 1);
}

#[tokio::test]
async fn test_send_failure_does_not_stop_session() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    driver.set_fail_send(true);
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));

    let mut config = config(&dir);
    config.requests = vec![DiagnosticRequest::periodic(
        RequestFrame::new(0x7DF, vec![0x01, 0x03]),
        Duration::ZERO,
        Duration::from_millis(10),
    )];
    let service = service(config, &driver, &clock);

    service.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.is_running());

    driver.set_fail_send(false);
    assert!(wait_until(|| !driver.sent_frames().is_empty()).await);
    service.stop().await;
}

#[tokio::test]
async fn test_log_rotates_on_date_change() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 23, 59, 59));
    let config = config(&dir);
    let first = capture_log_path(&config.capture_dir, date(2024, 6, 10));
    let second = capture_log_path(&config.capture_dir, date(2024, 6, 11));
    let service = service(config, &driver, &clock);

    service.start().await;
    assert!(wait_until(|| first.exists()).await);

    clock.advance(chrono::Duration::seconds(2));
    assert!(wait_until(|| captures_started(&driver) == 2).await);
    service.stop().await;

    assert_eq!(
        std::fs::read_to_string(&first).unwrap().trim(),
        "20240610_235959 HUMS-0042"
    );
    assert_eq!(
        std::fs::read_to_string(&second).unwrap().trim(),
        "20240611_000001 HUMS-0042"
    );
    assert_eq!(driver.count(|e| *e == DriverEvent::CaptureStopped), 2);
}

#[tokio::test]
async fn test_capture_exit_keeps_session_alive() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let service = service(config(&dir), &driver, &clock);

    service.start().await;
    driver.set_capture_exited(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(service.is_running());

    service.stop().await;
    assert_eq!(
        driver.count(|e| matches!(e, DriverEvent::BringDown { .. })),
        1
    );
}

#[tokio::test]
async fn test_manual_bring_up_and_send() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let service = service(config(&dir), &driver, &clock);

    service.bring_interface_up().await.unwrap();
    service
        .send_request(&RequestFrame::new(0x7DF, vec![0x02, 0x09, 0x02]))
        .await;

    driver.set_fail_send(true);
    service
        .send_request(&RequestFrame::new(0x7DF, vec![0x01, 0x03]))
        .await;

    assert_eq!(
        driver.events(),
        vec![
            DriverEvent::BringUp {
                interface: "can0".to_string(),
                bitrate: 500_000
            },
            DriverEvent::Sent(RequestFrame::new(0x7DF, vec![0x02, 0x09, 0x02])),
        ]
    );

    driver.set_fail_bring_up(true);
    assert!(service.bring_interface_up().await.is_err());
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_stop_timeout_still_brings_interface_down() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    driver.set_capture_stop_delay(Duration::from_secs(30));
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 8, 0, 0));
    let mut config = config(&dir);
    config.stop_timeout = ms(100);
    let service = service(config, &driver, &clock);

    service.start().await;
    assert!(wait_until(|| captures_started(&driver) == 1).await);
    service.stop().await;

    assert!(!service.is_running());
    assert_eq!(
        driver.events().last(),
        Some(&DriverEvent::BringDown {
            interface: "can0".to_string()
        })
    );
}

#[tokio::test]
async fn test_rotation_survives_failed_capture_stop() {
    let dir = TempDir::new().unwrap();
    let driver = Arc::new(MockBusDriver::new());
    let clock = Arc::new(FixedClock::at(2024, 6, 10, 23, 59, 59));
    let config = config(&dir);
    let second = capture_log_path(&config.capture_dir, date(2024, 6, 11));
    let third = capture_log_path(&config.capture_dir, date(2024, 6, 12));
    let service = service(config, &driver, &clock);

    service.start().await;
    assert!(wait_until(|| captures_started(&driver) == 1).await);
    driver.set_fail_capture_stop(true);

    clock.advance(chrono::Duration::seconds(2));
    assert!(wait_until(|| captures_started(&driver) == 2).await);
    assert!(second.exists());

    // The new day's capture is in use, so the next date change rotates again
    clock.advance(chrono::Duration::days(1));
    assert!(wait_until(|| captures_started(&driver) == 3).await);
    assert!(third.exists());

    driver.set_fail_capture_stop(false);
    service.stop().await;
    assert!(!service.is_running());
    assert_eq!(driver.count(|e| *e == DriverEvent::CaptureStopped), 1);
}
