//! Live camera pose broadcast
//!
//! Viewers connect over TCP and receive one JSON object per line whenever
//! the viewport camera moves:
//!
//! ```json
//! {"rotation":[-0.1,0.0,-1.57],"translation":[0.0,-2.0,-10.0]}
//! ```

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use glam::{EulerRot, Mat4};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use scenepipe_core::decompose;

use crate::PipelineResult;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Camera pose as sent to viewers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Negated XYZ euler angles in radians
    pub rotation: [f32; 3],
    pub translation: [f32; 3],
}

impl CameraPose {
    /// Pose of a 4x4 view matrix
    pub fn from_view_matrix(view: &Mat4) -> Self {
        let d = decompose(view);
        // XYZ order: X applied first, so R = Rz * Ry * Rx
        let (z, y, x) = d.rotation.to_euler(EulerRot::ZYX);
        let t = view.w_axis;
        Self {
            rotation: [-x, -y, -z],
            translation: [t.x, t.y, t.z],
        }
    }

    /// One JSON line including the terminating newline
    pub fn to_line(&self) -> PipelineResult<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Non-blocking TCP broadcaster
#[derive(Debug)]
pub struct CameraBroadcaster {
    listener: TcpListener,
    clients: Vec<(SocketAddr, TcpStream)>,
    last_view: Option<Mat4>,
}

impl CameraBroadcaster {
    pub fn bind(addr: impl ToSocketAddrs) -> PipelineResult<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        tracing::info!(addr = %listener.local_addr()?, "Camera stream listening");
        Ok(Self {
            listener,
            clients: Vec::new(),
            last_view: None,
        })
    }

    pub fn local_addr(&self) -> PipelineResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Accept every connection waiting in the backlog
    pub fn accept_pending(&mut self) -> usize {
        let mut accepted = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = Self::prepare(&stream) {
                        tracing::warn!(%addr, error = %e, "Rejecting client");
                        continue;
                    }
                    tracing::info!(%addr, "Camera stream client connected");
                    self.clients.push((addr, stream));
                    accepted += 1;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
        accepted
    }

    fn prepare(stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        stream.set_nodelay(true)
    }

    /// Send `view` to every client if it differs from the last one sent
    ///
    /// Returns whether a pose was sent. Clients whose write fails are
    /// dropped.
    pub fn publish(&mut self, view: &Mat4) -> PipelineResult<bool> {
        if self.last_view.as_ref() == Some(view) {
            return Ok(false);
        }

        let pose = CameraPose::from_view_matrix(view);
        let line = pose.to_line()?;
        tracing::debug!(translation = ?pose.translation, clients = self.clients.len(), "Broadcasting camera pose");

        self.clients.retain_mut(|(addr, stream)| match stream.write_all(line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                tracing::info!(%addr, error = %e, "Dropping camera stream client");
                false
            }
        });
        self.last_view = Some(*view);
        Ok(true)
    }

    /// Accept pending clients and publish in one step
    pub fn tick(&mut self, view: Option<&Mat4>) -> PipelineResult<bool> {
        self.accept_pending();
        match view {
            Some(view) => self.publish(view),
            None => Ok(false),
        }
    }

    /// Run on a background thread, publishing the latest view every `tick`
    pub fn spawn(self, tick: Duration) -> PipelineResult<StreamHandle> {
        let addr = self.local_addr()?;
        let latest = Arc::new(Mutex::new(None::<Mat4>));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let latest = Arc::clone(&latest);
            let stop = Arc::clone(&stop);
            let mut broadcaster = self;
            thread::Builder::new()
                .name("camera-stream".into())
                .spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        let view = *latest.lock();
                        if let Err(e) = broadcaster.tick(view.as_ref()) {
                            tracing::warn!(error = %e, "Camera stream tick failed");
                        }
                        thread::sleep(tick);
                    }
                    tracing::debug!("Camera stream stopped");
                })?
        };

        Ok(StreamHandle {
            addr,
            latest,
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a broadcaster running on its own thread
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct StreamHandle {
    addr: SocketAddr,
    latest: Arc<Mutex<Option<Mat4>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Replace the view published on the next tick
    pub fn set_view(&self, view: Mat4) {
        *self.latest.lock() = Some(view);
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Camera stream thread panicked");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use std::io::{BufRead, BufReader};

    fn connect(broadcaster: &mut CameraBroadcaster) -> BufReader<TcpStream> {
        let client = TcpStream::connect(broadcaster.local_addr().unwrap()).unwrap();
        for _ in 0..100 {
            if broadcaster.accept_pending() > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(broadcaster.client_count(), 1);
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        BufReader::new(client)
    }

    #[test]
    fn test_pose_from_view_matrix() {
        let view = Mat4::from_rotation_translation(Quat::from_rotation_z(0.5), Vec3::new(1.0, 2.0, 3.0));
        let pose = CameraPose::from_view_matrix(&view);
        assert_eq!(pose.translation, [1.0, 2.0, 3.0]);
        assert!(pose.rotation[0].abs() < 1e-6);
        assert!(pose.rotation[1].abs() < 1e-6);
        assert!((pose.rotation[2] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_publish_only_on_change() {
        let mut broadcaster = CameraBroadcaster::bind("127.0.0.1:0").unwrap();
        let mut reader = connect(&mut broadcaster);

        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        assert!(broadcaster.publish(&view).unwrap());
        assert!(!broadcaster.publish(&view).unwrap());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let pose: CameraPose = serde_json::from_str(&line).unwrap();
        assert_eq!(pose.translation, [0.0, 0.0, -10.0]);

        let moved = Mat4::from_translation(Vec3::new(0.0, 1.0, -10.0));
        assert!(broadcaster.publish(&moved).unwrap());
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"translation\":[0.0,1.0,-10.0]"));
    }

    #[test]
    fn test_disconnected_client_is_dropped() {
        let mut broadcaster = CameraBroadcaster::bind("127.0.0.1:0").unwrap();
        drop(connect(&mut broadcaster));

        for i in 0..100 {
            broadcaster
                .publish(&Mat4::from_translation(Vec3::X * i as f32))
                .unwrap();
            if broadcaster.client_count() == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(broadcaster.client_count(), 0);
    }

    #[test]
    fn test_background_stream() {
        let broadcaster = CameraBroadcaster::bind("127.0.0.1:0").unwrap();
        let handle = broadcaster.spawn(Duration::from_millis(5)).unwrap();
        let client = TcpStream::connect(handle.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut reader = BufReader::new(client);

        handle.set_view(Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)));
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let pose: CameraPose = serde_json::from_str(&line).unwrap();
        assert_eq!(pose.translation, [4.0, 5.0, 6.0]);

        handle.stop();
    }
}
