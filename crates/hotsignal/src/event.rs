/// The two event kinds carried over a signaling channel.
///
/// The wire form of an event is its literal name as UTF-8, with no framing
/// and no payload — the entire message body is the event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
	/// A build cycle just completed and output artifacts changed.
	BuildEmitted,
	/// The recipient should restart its supervised child process.
	Restart,
}

impl Event {
	pub fn as_str(&self) -> &'static str {
		match self {
			Event::BuildEmitted => "build_emitted",
			Event::Restart => "restart",
		}
	}

	/// Decode a raw message body. Anything that is not exactly one of the
	/// two literals yields `None` and is ignored by clients, never treated
	/// as a protocol error.
	pub fn from_bytes(data: &[u8]) -> Option<Event> {
		match data {
			b"build_emitted" => Some(Event::BuildEmitted),
			b"restart" => Some(Event::Restart),
			_ => None,
		}
	}
}

impl std::fmt::Display for Event {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
