use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use crate::supervisor::Control;

/// A line exactly equal to this keyword triggers a restart.
pub const RESTART_KEYWORD: &str = "rs";

/// Watches a line-oriented input and requests a restart for every line
/// exactly equal to [`RESTART_KEYWORD`]. Returns when the input ends or
/// the supervisor is gone.
pub async fn watch_restart_lines<R>(input: R, control: UnboundedSender<Control>)
where
	R: AsyncRead + Unpin,
{
	let mut lines = BufReader::new(input).lines();
	while let Ok(Some(line)) = lines.next_line().await {
		if line == RESTART_KEYWORD {
			tracing::info!("detected '{}' command on stdin, restarting...", RESTART_KEYWORD);
			if control.send(Control::Restart).is_err() {
				return;
			}
		}
	}
}
