//! Integration tests — full streaming lifecycle, exchange cycles, and
//! failure scenarios over a real TCP connection on localhost.

use std::time::Duration;

use stereolink_core::{
    CONTROL_SENTINEL, ConnectionStatus, Eye, StreamConfig, StreamingServer, TelemetryRecord,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// ── Helpers ──────────────────────────────────────────────────────

/// Grab an OS-assigned free port. The probe listener is dropped before
/// the server binds it.
fn free_port() -> u16 {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

/// Start a server bound to localhost on a fresh port.
async fn start_server(streaming: bool) -> (StreamingServer, u16) {
    let port = free_port();
    let server = StreamingServer::with_config(StreamConfig {
        bind_addr: "127.0.0.1".into(),
        port,
        image_streaming: streaming,
        ..StreamConfig::default()
    });
    server.start().await.unwrap();
    (server, port)
}

/// Dial the server, retrying while its listener comes up.
async fn connect(port: u16) -> TcpStream {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(s) => return s,
            Err(e) => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "server never came up: {e}"
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }
}

/// Send one client upload: sentinel plus a telemetry record.
async fn send_record(stream: &mut TcpStream, record: &TelemetryRecord) {
    stream.write_all(&CONTROL_SENTINEL).await.unwrap();
    stream.write_all(&record.encode()).await.unwrap();
}

/// Read one streaming response, returning the two compressed eye
/// payloads (either may be empty before the first frame is encoded).
async fn read_response(stream: &mut TcpStream) -> (Vec<u8>, Vec<u8>) {
    let mut sentinel = [0u8; 4];
    stream.read_exact(&mut sentinel).await.unwrap();
    assert_eq!(sentinel, CONTROL_SENTINEL);

    let mut sizes = [0u8; 8];
    stream.read_exact(&mut sizes).await.unwrap();
    let left = u32::from_le_bytes(sizes[0..4].try_into().unwrap()) as usize;
    let right = u32::from_le_bytes(sizes[4..8].try_into().unwrap()) as usize;

    let mut left_buf = vec![0u8; left];
    stream.read_exact(&mut left_buf).await.unwrap();
    let mut right_buf = vec![0u8; right];
    stream.read_exact(&mut right_buf).await.unwrap();
    (left_buf, right_buf)
}

/// Poll server status until `want`, panicking after two seconds.
async fn wait_for_status(server: &StreamingServer, want: ConnectionStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while server.status() != want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "status stuck at {}, wanted {want}",
            server.status()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Exchange cycles ──────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_streaming_exchange() {
    let (server, port) = start_server(true).await;

    // Render a recognizable pattern into both eyes before any client
    // shows up.
    let len = server.frames().await.eye_len(Eye::Left);
    let left_pixels: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let right_pixels: Vec<u8> = (0..len).map(|i| (i % 241) as u8).collect();
    server.fill_frame(Eye::Left, &left_pixels).await.unwrap();
    server.fill_frame(Eye::Right, &right_pixels).await.unwrap();
    server.notify_new_frame();

    let mut client = connect(port).await;

    let mut record = TelemetryRecord::default();
    record.device_type = 3;
    record.tracking = 1;
    record.tex_width = 320;
    record.tex_height = 240;
    record.head_pose[3][1] = 1.7;

    // The first cycles may answer with empty sizes while the encoder
    // finishes; keep exchanging until a payload arrives.
    let mut payload = None;
    for _ in 0..50 {
        send_record(&mut client, &record).await;
        let (l, r) = read_response(&mut client).await;
        if !l.is_empty() && !r.is_empty() {
            payload = Some((l, r));
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let (l, r) = payload.expect("no frame payload within 50 cycles");

    assert_eq!(zstd::decode_all(&l[..]).unwrap(), left_pixels);
    assert_eq!(zstd::decode_all(&r[..]).unwrap(), right_pixels);

    assert_eq!(server.status(), ConnectionStatus::Connected);
    assert!(server.is_initialized());
    assert_eq!(server.latest_telemetry().await, record);

    server.stop().await.unwrap();
    assert_eq!(server.status(), ConnectionStatus::Inactive);
}

#[tokio::test]
async fn one_byte_at_a_time_client_completes_a_cycle() {
    let (server, port) = start_server(true).await;
    let mut client = connect(port).await;

    let record = TelemetryRecord::default();
    let mut upload = Vec::new();
    upload.extend_from_slice(&CONTROL_SENTINEL);
    upload.extend_from_slice(&record.encode());

    // Nagle is off server-side; dribble the upload byte by byte.
    for b in upload {
        client.write_all(&[b]).await.unwrap();
    }

    let mut sentinel = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut sentinel))
        .await
        .expect("no response")
        .unwrap();
    assert_eq!(sentinel, CONTROL_SENTINEL);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn non_streaming_mode_answers_with_bare_sentinel() {
    let (server, port) = start_server(false).await;
    let mut client = connect(port).await;

    // Two consecutive cycles: if anything beyond the sentinel were
    // sent, the second cycle's framing would misalign.
    for _ in 0..2 {
        send_record(&mut client, &TelemetryRecord::default()).await;
        let mut sentinel = [0u8; 4];
        client.read_exact(&mut sentinel).await.unwrap();
        assert_eq!(sentinel, CONTROL_SENTINEL);
    }

    assert!(server.is_initialized());
    server.stop().await.unwrap();
}

// ── Failure scenarios ────────────────────────────────────────────

#[tokio::test]
async fn stalled_client_is_dropped_within_the_deadline() {
    let (server, port) = start_server(true).await;
    let mut client = connect(port).await;
    wait_for_status(&server, ConnectionStatus::Connected).await;

    // Half a sentinel, then silence. The server must abandon the cycle
    // after its one-second deadline and close the connection.
    client.write_all(&CONTROL_SENTINEL[..2]).await.unwrap();

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(3), client.read(&mut buf)).await;
    match read {
        Ok(Ok(0)) => {}        // clean close
        Ok(Err(_)) => {}       // reset
        Ok(Ok(n)) => panic!("unexpected {n} bytes from a stalled cycle"),
        Err(_) => panic!("server kept the stalled session open"),
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn second_client_is_refused_while_one_is_connected() {
    let (server, port) = start_server(true).await;
    let mut first = connect(port).await;

    // Complete one exchange so the listener is certainly gone.
    send_record(&mut first, &TelemetryRecord::default()).await;
    read_response(&mut first).await;

    let second = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(second.is_err(), "listener should be dropped during a session");

    server.stop().await.unwrap();
}

// ── Lifecycle / rebinding ────────────────────────────────────────

#[tokio::test]
async fn rebind_from_parked_to_listening() {
    // No address at startup: the task parks.
    let server = StreamingServer::new();
    server.start().await.unwrap();
    wait_for_status(&server, ConnectionStatus::NotConnected).await;

    let port = free_port();
    server.set_bind_addr("127.0.0.1", port);
    wait_for_status(&server, ConnectionStatus::WaitingForClient).await;

    // And a client can actually get through on the new target.
    let mut client = connect(port).await;
    send_record(&mut client, &TelemetryRecord::default()).await;
    read_response(&mut client).await;

    server.stop().await.unwrap();
}
