//! Project management CLI for backend-api

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, bail};
use backend_api::auth::hashers::{Argon2Hasher, PasswordHasher};
use backend_api::build_application;
use backend_api::config::Settings;
use backend_api::core::{logging, server};
use clap::{Parser, Subcommand};
use console::style;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "manage")]
#[command(about = "backend-api management interface", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Settings file (TOML); falls back to BACKEND_SETTINGS
	#[arg(long, global = true, value_name = "FILE")]
	settings: Option<PathBuf>,

	/// Verbosity level (can be repeated for more output)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	verbosity: u8,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the server
	Runserver {
		/// Address or port to bind (default: host and port from settings)
		#[arg(value_name = "ADDRESS")]
		address: Option<String>,
	},

	/// Display all registered URL patterns
	Showurls {
		/// Show only named URLs
		#[arg(long)]
		names: bool,
	},

	/// Check the settings and URL configuration
	Check,

	/// Hash a password for the `password_hash` setting
	Hashpassword {
		#[arg(value_name = "PASSWORD")]
		password: String,
	},
}

fn log_filter(settings: &Settings, verbosity: u8) -> &str {
	match verbosity {
		0 => &settings.log_filter,
		1 => "debug",
		_ => "trace",
	}
}

/// Accepts `PORT`, `HOST:PORT` or `[V6]:PORT`
fn parse_address(address: &str, settings: &Settings) -> anyhow::Result<SocketAddr> {
	if let Ok(port) = address.parse::<u16>() {
		let settings = Settings {
			port,
			..settings.clone()
		};
		return Ok(settings.bind_address()?);
	}
	if let Ok(addr) = address.parse::<SocketAddr>() {
		return Ok(addr);
	}
	match address.rsplit_once(':') {
		Some((host, port)) => {
			let settings = Settings {
				host: host.to_string(),
				port: port
					.parse()
					.with_context(|| format!("invalid port in address '{}'", address))?,
				..settings.clone()
			};
			Ok(settings.bind_address()?)
		}
		None => bail!("'{}' is not a valid port number or address:port pair", address),
	}
}

async fn runserver(settings: Settings, address: Option<String>) -> anyhow::Result<()> {
	let addr = match address {
		Some(address) => parse_address(&address, &settings)?,
		None => settings.bind_address()?,
	};

	let app = build_application(&settings)
		.await
		.context("failed to build application")?;
	if settings.debug {
		tracing::warn!("debug is enabled; do not use this configuration in production");
	}

	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("failed to bind {}", addr))?;
	println!(
		"Starting server at {}",
		style(format!("http://{}/", listener.local_addr()?)).cyan()
	);
	println!("Quit the server with CONTROL-C.");

	app.server().serve(listener, server::shutdown_signal()).await?;
	Ok(())
}

async fn showurls(settings: Settings, names: bool) -> anyhow::Result<()> {
	let app = build_application(&settings).await?;

	for url in app.urls.url_list() {
		match (&url.name, names) {
			(Some(name), _) => println!("/{}  {}", url.pattern, style(name).green()),
			(None, false) => println!("/{}", url.pattern),
			(None, true) => {}
		}
	}
	Ok(())
}

async fn check(settings: Settings) -> anyhow::Result<()> {
	settings.bind_address()?;
	let app = build_application(&settings).await?;
	if app.urls.is_empty() {
		bail!("no URL patterns are configured");
	}
	if settings.users.is_empty() {
		println!(
			"{} no users are configured; every login will fail",
			style("WARNING:").yellow().bold()
		);
	}
	println!("System check identified no issues.");
	Ok(())
}

fn hashpassword(password: &str) -> anyhow::Result<()> {
	if password.is_empty() {
		bail!("password may not be blank");
	}
	println!("{}", Argon2Hasher::new().hash(password)?);
	Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	if let Commands::Hashpassword { password } = &cli.command {
		return hashpassword(password);
	}

	let settings = Settings::load(cli.settings.as_deref()).context("invalid settings")?;
	logging::init(log_filter(&settings, cli.verbosity));

	match cli.command {
		Commands::Runserver { address } => runserver(settings, address).await,
		Commands::Showurls { names } => showurls(settings, names).await,
		Commands::Check => check(settings).await,
		Commands::Hashpassword { .. } => Ok(()),
	}
}

#[tokio::main]
async fn main() {
	let cli = Cli::parse();

	if let Err(e) = run(cli).await {
		eprintln!("{} {:#}", style("Error:").red().bold(), e);
		process::exit(1);
	}
}
