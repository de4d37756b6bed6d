//! Replay over a real TCP socket

use std::time::Duration;

use imu_replay::{
    Encoding, PacingMode, Reassembler, Reassembly, Reading, Replay, ReplayConfig, SchedulerState,
    TcpReceiver, TcpTransport,
};

fn free_local_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn connect_with_retry(addr: &str) -> TcpReceiver {
    for _ in 0..100 {
        if let Ok(receiver) = TcpReceiver::connect(addr).await {
            return receiver;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sender never started listening on {}", addr);
}

fn readings(count: u64) -> Vec<Reading> {
    (0..count).map(|i| Reading::new(3, 5_000 + i, [i as u32; 3], [7, 8, 9])).collect()
}

#[tokio::test]
async fn packets_survive_the_socket() {
    let addr = free_local_addr();
    let config = ReplayConfig {
        mtu: 16,
        batch_size: 4,
        loop_playback: false,
        pacing: PacingMode::Fixed { interval_ms: 1 },
        ..ReplayConfig::default()
    };
    let scheduler = Replay::from_readings(readings(10), config, TcpTransport::new(addr.clone())).unwrap();
    let (handle, task) = scheduler.spawn();

    let mut receiver = connect_with_retry(&addr).await;
    assert_eq!(receiver.endpoint(), &ReplayConfig::default().endpoint);

    let encoder = Encoding::Wire.encoder();
    let mut reassembler = Reassembler::new(Duration::from_secs(5)).with_max_payload(16);
    let mut received = Vec::new();
    while let Some(bytes) = receiver.next_fragment().await.unwrap() {
        if let Reassembly::Complete(buffer) = reassembler.push_bytes(&bytes).unwrap() {
            received.push(encoder.decode(&buffer).unwrap());
        }
    }

    let report = task.await.unwrap();
    assert!(report.is_clean());
    assert_eq!(handle.state(), SchedulerState::Stopped);

    let ids: Vec<u32> = received.iter().map(|packet| packet.packet_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    let all: Vec<Reading> = received.into_iter().flat_map(|packet| packet.readings).collect();
    assert_eq!(all, readings(10));
    assert_eq!(reassembler.stats().completed, 3);
}

#[tokio::test]
async fn receiver_disconnect_returns_to_advertising() {
    let addr = free_local_addr();
    let config = ReplayConfig {
        mtu: 180,
        batch_size: 1,
        pacing: PacingMode::Fixed { interval_ms: 5 },
        ..ReplayConfig::default()
    };
    let scheduler = Replay::from_readings(readings(3), config, TcpTransport::new(addr.clone())).unwrap();
    let (handle, task) = scheduler.spawn();

    let mut first = connect_with_retry(&addr).await;
    assert!(first.next_fragment().await.unwrap().is_some());
    drop(first);

    assert!(handle.wait_for(SchedulerState::Advertising).await);
    let mut second = connect_with_retry(&addr).await;
    assert!(second.next_fragment().await.unwrap().is_some());

    handle.stop();
    let report = task.await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.stats.connections, 2);
}

#[tokio::test]
async fn peer_resetting_before_handshake_is_survived() {
    let addr = free_local_addr();
    let config = ReplayConfig {
        mtu: 16,
        batch_size: 4,
        loop_playback: false,
        pacing: PacingMode::Fixed { interval_ms: 1 },
        ..ReplayConfig::default()
    };
    let scheduler = Replay::from_readings(readings(10), config, TcpTransport::new(addr.clone())).unwrap();
    let (_handle, task) = scheduler.spawn();

    let mut impatient = None;
    for _ in 0..100 {
        if let Ok(stream) = tokio::net::TcpStream::connect(&addr).await {
            impatient = Some(stream);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let impatient = impatient.expect("sender never started listening");
    #[allow(deprecated)]
    impatient.set_linger(Some(Duration::ZERO)).unwrap();
    drop(impatient);

    let mut receiver = connect_with_retry(&addr).await;
    let encoder = Encoding::Wire.encoder();
    let mut reassembler = Reassembler::new(Duration::from_secs(5)).with_max_payload(16);
    let mut all = Vec::new();
    while let Some(bytes) = receiver.next_fragment().await.unwrap() {
        if let Reassembly::Complete(buffer) = reassembler.push_bytes(&bytes).unwrap() {
            all.extend(encoder.decode(&buffer).unwrap().readings);
        }
    }

    let report = task.await.unwrap();
    assert!(report.is_clean(), "session failed: {:?}", report.last_error);
    // The reset peer may have been handed the first packet before it went away.
    assert!(!all.is_empty());
    assert!(readings(10).ends_with(&all));
}
