use crate::event::Event;
use crate::server::RelayServer;

/// Build-observer side of a channel: announces completed build cycles to
/// every connected client.
///
/// The first `skip` announcements are swallowed so that an observer started
/// alongside a fresh build does not signal an update before any client
/// could possibly need one. The count is a parameter of the integration,
/// not a fixed rule; pass 0 to announce every build.
pub struct BuildObserver {
	server: RelayServer,
	skip: u32,
}

impl BuildObserver {
	pub fn new(server: RelayServer, skip: u32) -> Self {
		Self { server, skip }
	}

	/// Call exactly once per completed build cycle.
	pub async fn build_finished(&mut self) {
		if self.skip > 0 {
			self.skip -= 1;
			tracing::debug!("suppressing build announcement ({} more to skip)", self.skip);
			return;
		}
		self.server.broadcast(Event::BuildEmitted).await;
	}

	pub fn server(&self) -> &RelayServer {
		&self.server
	}
}
