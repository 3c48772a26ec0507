use owo_colors::OwoColorize;
use tracing::level_filters::LevelFilter;

use hotrun::{stdin, Control, Supervisor};
use hotsignal::{Channel, Event, RelayClient};

struct Options {
	restart_on_rs: bool,
	channel: String,
	level: LevelFilter,
	command: String,
	args: Vec<String>,
}

fn print_usage(message: Option<&str>) -> ! {
	if let Some(message) = message {
		eprintln!("{}", message);
		eprintln!();
	}
	eprintln!("{} — restart runner for hot-rebuild workflows", "hotrun".bold());
	eprintln!();
	eprintln!("usage: {} [options] command [command arguments]", "hotrun".bold());
	eprintln!();
	eprintln!("Runs the command and restarts it when the signaling server announces");
	eprintln!("a restart. A child that dies on its own is revived after the next");
	eprintln!("finished build; a child that exits 0 ends hotrun.");
	eprintln!();
	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {}   Channel name (default: hotsignal)", "--channel=<name>".bold());
	eprintln!("  {}            Do not listen for the restart command 'rs' on stdin", "--no-rs".bold());
	eprintln!("  {}           Suppress all output", "--silent".bold());
	eprintln!("  {}            Print debug messages (overrides --silent)", "--debug".bold());
	eprintln!("  {}       Show this help", "-h, --help".bold());
	std::process::exit(if message.is_some() { 1 } else { 0 });
}

fn parse_args(args: Vec<String>) -> Options {
	// Flags come first; the first bare word starts the child command line.
	let split = match args.iter().position(|a| !a.starts_with('-')) {
		Some(i) => i,
		None => {
			if args.iter().any(|a| a == "-h" || a == "--help") {
				print_usage(None);
			}
			print_usage(Some("No command found."));
		}
	};

	let mut options = Options {
		restart_on_rs: true,
		channel: String::new(),
		level: LevelFilter::INFO,
		command: args[split].clone(),
		args: args[split + 1..].to_vec(),
	};
	let mut debug = false;

	for arg in &args[..split] {
		let (key, value) = match arg.split_once('=') {
			Some((k, v)) => (k, Some(v)),
			None => (arg.as_str(), None),
		};
		match key {
			"-h" | "--help" => print_usage(None),
			"--no-rs" => {
				if value.is_some() {
					print_usage(Some("Cannot assign value to argument --no-rs."));
				}
				options.restart_on_rs = false;
			}
			"--channel" => match value {
				Some(v) if !v.is_empty() => options.channel = v.to_string(),
				_ => print_usage(Some("Channel name is empty.")),
			},
			"--silent" => {
				if value.is_some() {
					print_usage(Some("Cannot assign value to argument --silent."));
				}
				options.level = LevelFilter::OFF;
			}
			"--debug" => {
				if value.is_some() {
					print_usage(Some("Cannot assign value to argument --debug."));
				}
				debug = true;
			}
			_ => print_usage(Some(&format!("Invalid argument: {}", arg))),
		}
	}

	if debug {
		options.level = LevelFilter::DEBUG;
	}
	options
}

#[tokio::main]
async fn main() {
	let options = parse_args(std::env::args().skip(1).collect());

	tracing_subscriber::fmt()
		.with_max_level(options.level)
		.with_target(false)
		.init();

	let (supervisor, control) = Supervisor::new(options.command, options.args);

	let client = RelayClient::new(Channel::new(options.channel));
	{
		let control = control.clone();
		client.on(Event::Restart, move || {
			tracing::info!("received restart event, restarting child");
			let _ = control.send(Control::Restart);
		});
	}
	{
		let control = control.clone();
		client.on(Event::BuildEmitted, move || {
			let _ = control.send(Control::BuildFinished);
		});
	}
	client.connect();

	if options.restart_on_rs {
		let control = control.clone();
		tokio::spawn(async move {
			stdin::watch_restart_lines(tokio::io::stdin(), control).await;
		});
	}

	if let Err(e) = supervisor.run().await {
		tracing::error!("{}", e);
		std::process::exit(1);
	}
}
