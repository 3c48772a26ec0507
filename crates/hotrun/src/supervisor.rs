use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Control events that funnel into a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
	/// Restart the child now (external restart event or stdin keyword).
	Restart,
	/// A build cycle finished; restart the child if it is waiting for one.
	BuildFinished,
}

/// Errors from the supervisor. All of these are fatal: the supervisor
/// either cannot run the command or can no longer guarantee the old child
/// is dead before starting a new one.
#[derive(Debug)]
pub enum SupervisorError {
	Spawn { command: String, source: io::Error },
	Wait(io::Error),
	Kill(nix::errno::Errno),
}

impl std::fmt::Display for SupervisorError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SupervisorError::Spawn { command, source } => {
				write!(f, "failed to spawn '{}': {}", command, source)
			}
			SupervisorError::Wait(e) => write!(f, "failed to wait on child: {}", e),
			SupervisorError::Kill(e) => {
				write!(f, "failed to kill child process tree: {}", e)
			}
		}
	}
}

impl std::error::Error for SupervisorError {}

/// Owns one child command's lifecycle: spawn, watch for exit, restart on
/// demand, and wait for a finished build after an unprompted death.
///
/// All state lives on the single task driving [`run`](Supervisor::run), so
/// the restart-in-progress guard is a plain flag, not a lock. At most one
/// restart sequence is ever in flight.
pub struct Supervisor {
	command: String,
	args: Vec<String>,
	control: UnboundedReceiver<Control>,
	child: Option<Child>,
	restarting: bool,
	waiting_for_build: bool,
}

enum Step {
	Exited(io::Result<ExitStatus>),
	Event(Option<Control>),
}

impl Supervisor {
	/// Returns the supervisor and the sender feeding its control channel.
	pub fn new(command: impl Into<String>, args: Vec<String>) -> (Self, UnboundedSender<Control>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let supervisor = Self {
			command: command.into(),
			args,
			control: rx,
			child: None,
			restarting: false,
			waiting_for_build: false,
		};
		(supervisor, tx)
	}

	/// Spawns the child and reacts to exits and control events until the
	/// child finishes cleanly, or until every control sender is gone and no
	/// child remains.
	pub async fn run(mut self) -> Result<(), SupervisorError> {
		self.spawn_child()?;
		let mut control_open = true;

		loop {
			if self.child.is_none() && !control_open {
				return Ok(());
			}

			let child = &mut self.child;
			let control = &mut self.control;
			// Biased toward control so a restart request queued before an
			// exit is observed first and owns the respawn.
			let step = tokio::select! {
				biased;
				event = control.recv(), if control_open => Step::Event(event),
				status = wait_child(child) => Step::Exited(status),
			};

			match step {
				Step::Exited(result) => {
					let status = result.map_err(SupervisorError::Wait)?;
					self.child = None;
					if status.code() == Some(0) && !self.restarting {
						tracing::info!("child finished with exit code 0, quitting");
						return Ok(());
					}
					match status.code() {
						Some(code) => tracing::info!("child finished with exit code {}", code),
						None => {
							tracing::info!("child was terminated by signal {:?}", status.signal())
						}
					}
					if !self.restarting {
						tracing::info!("waiting for the next finished build to restart child");
						self.waiting_for_build = true;
					}
				}
				Step::Event(Some(Control::Restart)) => {
					self.restart_child().await?;
				}
				Step::Event(Some(Control::BuildFinished)) => {
					if self.waiting_for_build {
						self.waiting_for_build = false;
						tracing::info!("build finished, restarting child");
						self.restart_child().await?;
					} else {
						tracing::debug!("build finished, child does not need a restart");
					}
				}
				Step::Event(None) => control_open = false,
			}
		}
	}

	fn spawn_child(&mut self) -> Result<(), SupervisorError> {
		if self.child.is_some() {
			tracing::debug!("child is already running");
			return Ok(());
		}
		tracing::info!("running command: {} {}", self.command, self.args.join(" "));
		let child = Command::new(&self.command)
			.args(&self.args)
			.stdin(Stdio::inherit())
			.stdout(Stdio::inherit())
			.stderr(Stdio::inherit())
			.process_group(0)
			.spawn()
			.map_err(|source| SupervisorError::Spawn {
				command: self.command.clone(),
				source,
			})?;
		self.child = Some(child);
		Ok(())
	}

	/// Kills the current child tree (if any), waits for its confirmed exit,
	/// and spawns a replacement. Re-entry while a restart is in flight is a
	/// logged no-op; a second restart is never queued.
	async fn restart_child(&mut self) -> Result<(), SupervisorError> {
		if self.restarting {
			tracing::debug!("restart requested, but a restart is already in progress - ignoring");
			return Ok(());
		}
		self.restarting = true;
		self.waiting_for_build = false;

		if let Some(mut child) = self.child.take() {
			if let Some(pid) = child.id() {
				tracing::debug!("killing child process tree (pid {})", pid);
				kill_process_tree(pid)?;
				// The old tree is confirmed dead before the replacement
				// starts; two children must never race for the same
				// resources.
				let _ = child.wait().await;
			}
		}

		self.spawn_child()?;

		// Requests that piled up while this restart ran are stale; the
		// fresh child already satisfies them.
		while let Ok(event) = self.control.try_recv() {
			tracing::debug!("ignoring queued {:?} event during restart", event);
		}
		self.restarting = false;
		Ok(())
	}
}

async fn wait_child(child: &mut Option<Child>) -> io::Result<ExitStatus> {
	match child {
		Some(c) => c.wait().await,
		None => std::future::pending().await,
	}
}

/// Terminate a whole process group: SIGTERM now, SIGKILL three seconds
/// later if the group ignores it. "No such process" means the child beat
/// us to it and is not an error.
fn kill_process_tree(pid: u32) -> Result<(), SupervisorError> {
	use nix::errno::Errno;
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	let pgid = Pid::from_raw(pid as i32);
	match killpg(pgid, Signal::SIGTERM) {
		Ok(()) => {}
		Err(Errno::ESRCH) => return Ok(()),
		Err(e) => return Err(SupervisorError::Kill(e)),
	}
	std::thread::spawn(move || {
		std::thread::sleep(Duration::from_secs(3));
		let _ = killpg(pgid, Signal::SIGKILL);
	});
	Ok(())
}
