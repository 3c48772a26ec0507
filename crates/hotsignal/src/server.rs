use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::channel::Channel;
use crate::event::Event;

/// Errors from starting a relay server.
#[derive(Debug)]
pub enum ServerError {
	/// Another live server already answers on this channel.
	AlreadyRunning(PathBuf),
	/// Any other bind failure.
	Bind { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for ServerError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ServerError::AlreadyRunning(path) => write!(
				f,
				"cannot bind {}: another instance is already listening on this channel; \
				 use a different channel name to run in parallel",
				path.display()
			),
			ServerError::Bind { path, source } => {
				write!(f, "failed to bind {}: {}", path.display(), source)
			}
		}
	}
}

impl std::error::Error for ServerError {}

struct Peer {
	id: u64,
	queue: UnboundedSender<Vec<u8>>,
}

struct Shared {
	peers: Mutex<Vec<Peer>>,
	next_id: AtomicU64,
}

/// Broadcast relay over a Unix socket.
///
/// Accepts any number of clients and forwards whatever a client sends,
/// verbatim, to every other connected client. The server never validates
/// message bodies; decoding is the client's job. There is no shutdown API:
/// a server lives for the rest of the process.
pub struct RelayServer {
	shared: Arc<Shared>,
}

impl RelayServer {
	/// Bind the channel's socket and start accepting clients.
	///
	/// An address already in use means either a live server (fatal, with an
	/// actionable message) or a socket file left behind by a crashed one,
	/// which is removed and reclaimed. A probe connect distinguishes the
	/// two.
	pub async fn start(channel: &Channel) -> Result<Self, ServerError> {
		let path = channel.socket_path();

		let listener = match UnixListener::bind(&path) {
			Ok(l) => l,
			Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
				if UnixStream::connect(&path).await.is_ok() {
					return Err(ServerError::AlreadyRunning(path));
				}
				tracing::debug!("removing stale socket {}", path.display());
				let _ = std::fs::remove_file(&path);
				UnixListener::bind(&path).map_err(|source| ServerError::Bind {
					path: path.clone(),
					source,
				})?
			}
			Err(source) => return Err(ServerError::Bind { path, source }),
		};

		tracing::info!("signaling server started");
		tracing::debug!("signaling server bound to {}", path.display());

		let shared = Arc::new(Shared {
			peers: Mutex::new(Vec::new()),
			next_id: AtomicU64::new(0),
		});

		// The accept task is never joined; server lifetime equals process
		// lifetime.
		let accept_shared = Arc::clone(&shared);
		tokio::spawn(async move {
			accept_loop(listener, accept_shared).await;
		});

		Ok(Self { shared })
	}

	/// Broadcast an event to every connected client.
	pub async fn broadcast(&self, event: Event) {
		tracing::debug!("broadcasting '{}'", event);
		broadcast_raw(&self.shared, event.as_str().as_bytes(), None).await;
	}

	/// Number of currently connected clients.
	pub async fn connections(&self) -> usize {
		self.shared.peers.lock().await.len()
	}
}

async fn accept_loop(listener: UnixListener, shared: Arc<Shared>) {
	loop {
		let (stream, _) = match listener.accept().await {
			Ok(s) => s,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
		tracing::debug!("client {} connected to the signaling server", id);

		let (reader, writer) = stream.into_split();
		let (queue_tx, queue_rx) = mpsc::unbounded_channel();
		shared.peers.lock().await.push(Peer { id, queue: queue_tx });

		let write_shared = Arc::clone(&shared);
		tokio::spawn(async move {
			write_peer(writer, queue_rx, id, write_shared).await;
		});

		let shared = Arc::clone(&shared);
		tokio::spawn(async move {
			serve_peer(reader, id, shared).await;
		});
	}
}

/// Reads from one client until it disconnects, relaying every chunk to all
/// other clients on the way.
async fn serve_peer(mut reader: OwnedReadHalf, id: u64, shared: Arc<Shared>) {
	let mut buf = [0u8; 512];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				tracing::debug!("relaying {} bytes from client {}", n, id);
				broadcast_raw(&shared, &buf[..n], Some(id)).await;
			}
			Err(e) => {
				tracing::debug!("read error from client {}: {}", id, e);
				break;
			}
		}
	}

	shared.peers.lock().await.retain(|p| p.id != id);
	tracing::debug!("client {} disconnected from the signaling server", id);
}

/// Queue raw bytes for every peer except `exclude`, dropping peers whose
/// writer is gone. The connection-set lock is only ever held for the
/// enqueue; socket writes happen on the per-peer writer task, so one
/// stalled client can never block the channel.
async fn broadcast_raw(shared: &Shared, data: &[u8], exclude: Option<u64>) {
	let mut peers = shared.peers.lock().await;
	peers.retain(|peer| {
		if Some(peer.id) == exclude {
			return true;
		}
		peer.queue.send(data.to_vec()).is_ok()
	});
}

/// Drains one peer's queue onto its socket, in queue order. A write
/// failure drops the peer from the connection set.
async fn write_peer(
	mut writer: OwnedWriteHalf,
	mut queue: UnboundedReceiver<Vec<u8>>,
	id: u64,
	shared: Arc<Shared>,
) {
	while let Some(data) = queue.recv().await {
		if writer.write_all(&data).await.is_err() {
			tracing::debug!("write error to client {}, dropping connection", id);
			shared.peers.lock().await.retain(|p| p.id != id);
			return;
		}
	}
}
