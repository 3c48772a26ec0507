use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::channel::Channel;
use crate::event::Event;

/// Delay before retrying after a failed connect or a transport error.
const RETRY_DELAY: Duration = Duration::from_millis(500);
/// Connect errors are logged at most once per this window. Retrying itself
/// is never rate-limited, only the noise.
const ERROR_LOG_WINDOW: Duration = Duration::from_secs(10);

/// Errors from relay client operations.
#[derive(Debug)]
pub enum ClientError {
	/// No connection is currently established.
	NotConnected,
	/// IO error while writing to the connection.
	Io(io::Error),
}

impl std::fmt::Display for ClientError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ClientError::NotConnected => write!(f, "not connected, cannot send event"),
			ClientError::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for ClientError {}

impl From<io::Error> for ClientError {
	fn from(e: io::Error) -> Self {
		ClientError::Io(e)
	}
}

type Callback = Box<dyn FnMut() + Send>;

struct Registration {
	event: Event,
	once: bool,
	callback: Callback,
}

struct Shared {
	channel: Channel,
	connected: AtomicBool,
	generation: AtomicU64,
	writer: Mutex<Option<OwnedWriteHalf>>,
	handlers: std::sync::Mutex<Vec<Registration>>,
}

/// Client side of a signaling channel.
///
/// Connects to the channel's relay server, decodes incoming messages into
/// [`Event`]s and invokes registered handlers, and can send events itself.
/// The client reconnects indefinitely: immediately after a clean disconnect,
/// and after [`RETRY_DELAY`] when the connect or transport fails.
pub struct RelayClient {
	shared: Arc<Shared>,
}

impl RelayClient {
	pub fn new(channel: Channel) -> Self {
		Self {
			shared: Arc::new(Shared {
				channel,
				connected: AtomicBool::new(false),
				generation: AtomicU64::new(0),
				writer: Mutex::new(None),
				handlers: std::sync::Mutex::new(Vec::new()),
			}),
		}
	}

	/// Register a durable handler for an event kind.
	pub fn on(&self, event: Event, callback: impl FnMut() + Send + 'static) {
		self.register(event, false, Box::new(callback));
	}

	/// Register a handler that is removed after its first invocation.
	pub fn once(&self, event: Event, callback: impl FnMut() + Send + 'static) {
		self.register(event, true, Box::new(callback));
	}

	fn register(&self, event: Event, once: bool, callback: Callback) {
		let mut handlers = self.shared.handlers.lock().unwrap();
		handlers.push(Registration {
			event,
			once,
			callback,
		});
	}

	/// Start (or restart) the connection driver. Returns immediately; the
	/// connection outcome is reported via logs, handlers, and
	/// [`is_connected`](Self::is_connected), never via a return value.
	///
	/// A new call supersedes any earlier driver: the stale driver notices
	/// the generation change, returns, and drops its connection.
	pub fn connect(&self) {
		let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let shared = Arc::clone(&self.shared);
		tokio::spawn(async move {
			run_connection(shared, generation).await;
		});
	}

	pub fn is_connected(&self) -> bool {
		self.shared.connected.load(Ordering::SeqCst)
	}

	/// Send an event over the active connection.
	///
	/// Fails with [`ClientError::NotConnected`] when no connection is
	/// established. Callers are expected to log and continue degraded
	/// rather than crash.
	pub async fn send(&self, event: Event) -> Result<(), ClientError> {
		let mut writer = self.shared.writer.lock().await;
		match writer.as_mut() {
			Some(w) => {
				w.write_all(event.as_str().as_bytes()).await?;
				Ok(())
			}
			None => Err(ClientError::NotConnected),
		}
	}
}

enum Disconnect {
	Clean,
	Error(io::Error),
}

async fn run_connection(shared: Arc<Shared>, generation: u64) {
	let path = shared.channel.socket_path();
	let mut throttle = LogThrottle::new(ERROR_LOG_WINDOW);

	loop {
		if shared.generation.load(Ordering::SeqCst) != generation {
			// Superseded by a newer connect() call.
			return;
		}

		match UnixStream::connect(&path).await {
			Ok(stream) => {
				if shared.generation.load(Ordering::SeqCst) != generation {
					// Dropping the stream closes it.
					return;
				}

				tracing::info!("connected to signaling server");
				let (mut reader, writer) = stream.into_split();
				*shared.writer.lock().await = Some(writer);
				shared.connected.store(true, Ordering::SeqCst);

				let disconnect = read_events(&shared, &mut reader).await;

				if shared.generation.load(Ordering::SeqCst) != generation {
					// Superseded while reading; the shared state belongs
					// to the new driver now.
					return;
				}
				shared.connected.store(false, Ordering::SeqCst);
				*shared.writer.lock().await = None;

				match disconnect {
					Disconnect::Clean => {
						// The server is reachable and likely just cycling;
						// retry without delay.
						tracing::warn!("lost connection to signaling server, reconnecting...");
						continue;
					}
					Disconnect::Error(e) => {
						if throttle.ready() {
							tracing::warn!("connection to signaling server failed ({}), retrying...", e);
						}
					}
				}
			}
			Err(e) => {
				if throttle.ready() {
					tracing::warn!("failed to connect to signaling server ({}), retrying...", e);
				}
			}
		}

		tokio::time::sleep(RETRY_DELAY).await;
	}
}

/// Reads from the connection until it ends, dispatching recognized events.
async fn read_events(shared: &Shared, reader: &mut OwnedReadHalf) -> Disconnect {
	let mut buf = [0u8; 512];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => return Disconnect::Clean,
			Ok(n) => match Event::from_bytes(&buf[..n]) {
				Some(event) => {
					tracing::debug!("received '{}' event", event);
					dispatch(shared, event);
				}
				None => {
					tracing::debug!("ignoring unrecognized message ({} bytes)", n);
				}
			},
			Err(e) => return Disconnect::Error(e),
		}
	}
}

fn dispatch(shared: &Shared, event: Event) {
	let mut handlers = shared.handlers.lock().unwrap();
	let mut i = 0;
	while i < handlers.len() {
		if handlers[i].event == event {
			(handlers[i].callback)();
			if handlers[i].once {
				handlers.remove(i);
				continue;
			}
		}
		i += 1;
	}
}

/// Tracks the last time a message was logged and suppresses further ones
/// inside the window.
struct LogThrottle {
	window: Duration,
	last: Option<Instant>,
}

impl LogThrottle {
	fn new(window: Duration) -> Self {
		Self { window, last: None }
	}

	fn ready(&mut self) -> bool {
		match self.last {
			Some(t) if t.elapsed() < self.window => false,
			_ => {
				self.last = Some(Instant::now());
				true
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn throttle_first_call_is_ready() {
		let mut t = LogThrottle::new(Duration::from_secs(10));
		assert!(t.ready());
	}

	#[test]
	fn throttle_suppresses_inside_window() {
		let mut t = LogThrottle::new(Duration::from_secs(10));
		assert!(t.ready());
		assert!(!t.ready());
		assert!(!t.ready());
	}

	#[test]
	fn throttle_ready_again_after_window() {
		let mut t = LogThrottle::new(Duration::from_millis(10));
		assert!(t.ready());
		assert!(!t.ready());
		std::thread::sleep(Duration::from_millis(20));
		assert!(t.ready());
	}
}
