//! End-to-end tests for session setup and the capture worker

use assert_matches::assert_matches;
use bytes::Bytes;
use parking_lot::Mutex;
use sf_camera::{
    CameraHandle, CameraSession, CaptureError, CaptureEvent, CaptureSettings, CaptureWorker,
    ChannelSink, ColorMode, DeviceError, ErrorPolicy, Frame, FrameGeometry, PixelFormat,
    SessionConfig, SimulatedCamera, WorkerState,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Capture,
    Publish(u64),
}

/// Simulated camera that logs every image read
struct RecordingCamera {
    inner: SimulatedCamera,
    log: Arc<Mutex<Vec<Event>>>,
}

impl CameraHandle for RecordingCamera {
    fn reset_camera(&mut self) -> Result<(), DeviceError> {
        self.inner.reset_camera()
    }

    fn set_color_mode(&mut self, mode: ColorMode) -> Result<(), DeviceError> {
        self.inner.set_color_mode(mode)
    }

    fn reset_counts(&mut self) -> Result<(), DeviceError> {
        self.inner.reset_counts()
    }

    fn read_pixel_count(&mut self) -> Result<u32, DeviceError> {
        self.inner.read_pixel_count()
    }

    fn read_row_count(&mut self) -> Result<u32, DeviceError> {
        self.inner.read_row_count()
    }

    fn get_raw_image(&mut self) -> Result<Bytes, DeviceError> {
        self.log.lock().push(Event::Capture);
        self.inner.get_raw_image()
    }
}

fn settings(lock_timeout_ms: u64) -> CaptureSettings {
    CaptureSettings {
        lock_timeout: Duration::from_millis(lock_timeout_ms),
        on_error: ErrorPolicy::Halt,
    }
}

fn ready_camera(width: u32, height: u32) -> Arc<Mutex<SimulatedCamera>> {
    let mut camera = SimulatedCamera::new(width, height);
    camera.reset_camera().unwrap();
    Arc::new(Mutex::new(camera))
}

fn session_config() -> SessionConfig {
    SessionConfig {
        settle_delay: Duration::from_millis(1),
        capture: settings(20),
        ..SessionConfig::default()
    }
}

fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_frames_published_under_lock_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut inner = SimulatedCamera::new(8, 4);
    inner.reset_camera().unwrap();
    let camera = Arc::new(Mutex::new(RecordingCamera {
        inner,
        log: Arc::clone(&log),
    }));

    let worker = CaptureWorker::new(
        Arc::clone(&camera),
        FrameGeometry { width: 8, height: 4 },
        PixelFormat::Rgb565,
        settings(10),
    );

    let report = worker.run(&mut |frame: Frame| {
        assert!(camera.is_locked(), "frame published without the capture lock");
        assert!(worker.is_capturing());
        log.lock().push(Event::Publish(frame.sequence()));
        if frame.sequence() == 9 {
            worker.terminate();
        }
    });

    assert_eq!(report.state, WorkerState::Terminated);
    assert_eq!(report.stats.frames_captured, 10);
    assert!(!camera.is_locked());
    assert!(!worker.is_capturing());

    let log = log.lock();
    assert_eq!(log.len(), 20);
    for (i, pair) in log.chunks(2).enumerate() {
        assert_eq!(pair, &[Event::Capture, Event::Publish(i as u64)]);
    }
}

#[test]
fn test_contention_publishes_nothing() {
    let camera = ready_camera(8, 4);
    let worker = CaptureWorker::new(
        Arc::clone(&camera),
        FrameGeometry { width: 8, height: 4 },
        PixelFormat::Rgb565,
        settings(10),
    );

    let guard = camera.lock();
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = worker
        .spawn(move |frame: Frame| {
            let _ = tx.send(frame.sequence());
        })
        .unwrap();

    assert!(wait_for(|| handle.stats().lock_timeouts >= 3));
    assert_eq!(handle.state(), WorkerState::Running);
    assert_eq!(handle.stats().frames_captured, 0);
    assert!(!handle.is_capturing());

    // Terminate while the lock is still held; the in-flight attempt may
    // acquire it after release but must not capture.
    handle.terminate();
    let timeouts_at_terminate = handle.stats().lock_timeouts;
    drop(guard);

    let report = handle.join().unwrap();
    assert_eq!(report.state, WorkerState::Terminated);
    assert_eq!(report.stats.frames_captured, 0);
    assert!(report.stats.lock_timeouts <= timeouts_at_terminate + 1);
    assert!(report.error.is_none());
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_termination_latency_bounded_by_lock_timeout() {
    let camera = ready_camera(8, 4);
    let worker = CaptureWorker::new(
        Arc::clone(&camera),
        FrameGeometry { width: 8, height: 4 },
        PixelFormat::Rgb565,
        settings(50),
    );

    let _guard = camera.lock();
    let handle = worker.spawn(|_frame: Frame| {}).unwrap();
    assert!(wait_for(|| handle.state() == WorkerState::Running));

    let start = Instant::now();
    let report = handle.stop().unwrap();
    assert_eq!(report.state, WorkerState::Terminated);
    // One lock timeout plus scheduling slack
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_terminated_before_start() {
    let worker = CaptureWorker::new(
        ready_camera(8, 4),
        FrameGeometry { width: 8, height: 4 },
        PixelFormat::Rgb565,
        settings(10),
    );
    worker.terminate();

    let handle = worker
        .spawn(|_frame: Frame| panic!("no frame expected"))
        .unwrap();
    let report = handle.join().unwrap();

    assert_eq!(report.state, WorkerState::Terminated);
    assert_eq!(report.stats.frames_captured, 0);
    assert_eq!(report.stats.lock_timeouts, 0);
}

#[test]
fn test_session_setup_is_idempotent() {
    let mut session = CameraSession::new(SimulatedCamera::new(640, 480), session_config());

    let first = session.setup().unwrap();
    let second = session.setup().unwrap();

    assert_eq!(first, FrameGeometry { width: 640, height: 480 });
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_channel_sink_delivers_frames_in_order() {
    let mut session = CameraSession::new(SimulatedCamera::new(32, 16), session_config());
    let geometry = session.setup().unwrap();

    let (sink, mut events) = ChannelSink::channel(2);
    session.start(sink).unwrap();

    for expected in 0..5u64 {
        match events.recv().await {
            Some(CaptureEvent::Frame(frame)) => {
                assert_eq!(frame.sequence(), expected);
                assert_eq!(frame.width(), geometry.width);
                assert_eq!(frame.height(), geometry.height);
                assert_eq!(frame.format(), PixelFormat::Rgb565);
                assert_eq!(frame.data().len(), 32 * 16 * 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    drop(events);
    let report = tokio::task::spawn_blocking(move || session.stop())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(report.stats.frames_captured >= 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_capture_error_reported_through_channel() {
    let camera = SimulatedCamera::new(16, 8).fail_after(2);
    let mut session = CameraSession::new(camera, session_config());
    session.setup().unwrap();

    let (sink, mut events) = ChannelSink::channel(8);
    session.start(sink).unwrap();

    assert_matches!(events.recv().await, Some(CaptureEvent::Frame(_)));
    assert_matches!(events.recv().await, Some(CaptureEvent::Frame(_)));
    assert_matches!(events.recv().await, Some(CaptureEvent::Error(_)));
    // Worker halts and drops the sink
    assert_matches!(events.recv().await, None);

    let report = tokio::task::spawn_blocking(move || session.stop())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(report.state, WorkerState::Terminated);
    assert_eq!(report.stats.frames_captured, 2);
    assert_matches!(report.error, Some(CaptureError::Device(DeviceError::Register(_))));
}

#[test]
fn test_black_and_white_session_captures_gray_frames() {
    let mut session = CameraSession::new(SimulatedCamera::new(16, 8), session_config());
    session.set_black_and_white();
    session.setup().unwrap();

    let worker = session.take_worker().unwrap();
    assert_eq!(worker.format(), PixelFormat::Gray8);
    assert!(session.worker_state().is_none());

    let mut frames = Vec::new();
    let report = worker.run(&mut |frame: Frame| {
        frames.push(frame);
        if frames.len() == 2 {
            worker.terminate();
        }
    });

    assert_eq!(report.stats.frames_captured, 2);
    assert_eq!(frames[0].data().len(), 16 * 8);
    assert_eq!(frames[1].pixel(0, 0), Some(1));
}
