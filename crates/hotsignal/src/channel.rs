use std::path::PathBuf;

/// Channel name used when none is given. Two processes agree on a channel
/// purely by using the same name.
pub const DEFAULT_CHANNEL: &str = "hotsignal";

/// A named logical signaling endpoint, resolved to one local socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
	pub name: String,
}

impl Channel {
	/// An empty name substitutes [`DEFAULT_CHANNEL`].
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		Self {
			name: if name.is_empty() {
				DEFAULT_CHANNEL.to_string()
			} else {
				name
			},
		}
	}

	/// Resolve the channel to its platform address. Pure string
	/// construction, no I/O.
	pub fn socket_path(&self) -> PathBuf {
		#[cfg(windows)]
		{
			PathBuf::from(format!(r"\\.\pipe\{}", self.name))
		}
		#[cfg(not(windows))]
		{
			PathBuf::from("/tmp").join(format!("{}.sock", self.name))
		}
	}
}

impl Default for Channel {
	fn default() -> Self {
		Self::new(DEFAULT_CHANNEL)
	}
}
