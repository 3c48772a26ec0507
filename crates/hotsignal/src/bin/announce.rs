use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::level_filters::LevelFilter;

use hotsignal::{BuildObserver, Channel, RelayServer};

struct Options {
	channel: String,
	skip: u32,
	level: LevelFilter,
}

fn print_usage(message: Option<&str>) -> ! {
	if let Some(message) = message {
		eprintln!("{}", message);
		eprintln!();
	}
	eprintln!("{} — build announcer for hotrun", "hot-announce".bold());
	eprintln!();
	eprintln!("usage: {} [options]", "hot-announce".bold());
	eprintln!();
	eprintln!("Runs the signaling server and broadcasts one finished-build event");
	eprintln!("per line read on stdin. Pipe your build tool's completion output in.");
	eprintln!();
	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {}   Channel name (default: hotsignal)", "--channel=<name>".bold());
	eprintln!("  {}     Suppress the first <count> announcements (default: 1)", "--skip=<count>".bold());
	eprintln!("  {}           Suppress all output", "--silent".bold());
	eprintln!("  {}            Print debug messages (overrides --silent)", "--debug".bold());
	eprintln!("  {}       Show this help", "-h, --help".bold());
	std::process::exit(if message.is_some() { 1 } else { 0 });
}

fn parse_args(args: Vec<String>) -> Options {
	let mut options = Options {
		channel: String::new(),
		skip: 1,
		level: LevelFilter::INFO,
	};
	let mut debug = false;

	for arg in &args {
		let (key, value) = match arg.split_once('=') {
			Some((k, v)) => (k, Some(v)),
			None => (arg.as_str(), None),
		};
		match key {
			"-h" | "--help" => print_usage(None),
			"--channel" => match value {
				Some(v) if !v.is_empty() => options.channel = v.to_string(),
				_ => print_usage(Some("Channel name is empty.")),
			},
			"--skip" => match value.and_then(|v| v.parse().ok()) {
				Some(n) => options.skip = n,
				None => print_usage(Some("Argument --skip needs a numeric value.")),
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

	let channel = Channel::new(options.channel);
	let server = match RelayServer::start(&channel).await {
		Ok(s) => s,
		Err(e) => {
			tracing::error!("{}", e);
			std::process::exit(1);
		}
	};
	let mut observer = BuildObserver::new(server, options.skip);

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	while let Ok(Some(_)) = lines.next_line().await {
		observer.build_finished().await;
	}

	// Stdin closed; keep relaying between clients for the rest of the
	// process.
	tracing::debug!("stdin closed, continuing to serve the channel");
	std::future::pending::<()>().await;
}
