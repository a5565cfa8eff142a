use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};

use mdns_dnssd::DaemonConfig;

/// mDNS / DNS-SD browse and query tool
#[derive(Parser, Debug)]
#[command(name = "dnssd-browse")]
#[command(about = "Browse and query mDNS / DNS-SD services on the local network")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	/// How long to listen for answers, in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "3000", global = true)]
	pub timeout: u64,

	/// Only accept answers from this interface index (0 = any)
	#[arg(short = 'i', long = "interface-index", default_value = "0", global = true)]
	pub if_index: u32,

	/// IPv4 address of the interface to join the multicast group on
	#[arg(long = "bind-interface", default_value = "0.0.0.0", global = true)]
	pub bind_interface: Ipv4Addr,

	/// Send each question once instead of re-querying with backoff
	#[arg(long = "no-requery", global = true)]
	pub no_requery: bool,

	/// Random extra delay on re-queries, in percent of the interval
	#[arg(long = "jitter", default_value = "20", global = true)]
	pub jitter_percent: u32,

	/// Output CSV file path
	#[arg(short = 'o', long = "output", global = true)]
	pub output: Option<String>,

	/// Increase log verbosity (repeatable)
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
	pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Browse for instances of a service type (e.g. _http._tcp)
	Browse {
		service_type: String,

		/// Domain to browse; blank means local
		#[arg(short = 'd', long = "domain", default_value = "")]
		domain: String,
	},
	/// Query an arbitrary record
	Query {
		/// Fully qualified name, escaped (e.g. My\032Printer._ipp._tcp.local.)
		name: String,

		/// Record type (A, AAAA, SRV, TXT, PTR, ANY, ...)
		#[arg(long = "type", default_value = "A")]
		record_type: String,

		/// Record class
		#[arg(long = "class", default_value = "IN")]
		record_class: String,
	},
}

impl Cli {
	/// Build the daemon configuration from the command line.
	pub fn daemon_config(&self) -> DaemonConfig {
		DaemonConfig {
			requery: !self.no_requery,
			jitter_percent: self.jitter_percent,
			..DaemonConfig::default()
		}
	}

	pub fn listen_for(&self) -> Duration {
		Duration::from_millis(self.timeout)
	}

	/// Log filter directive derived from `--verbose`.
	pub fn log_filter(&self) -> &'static str {
		match self.verbose {
			0 => "warn",
			1 => "info",
			2 => "debug",
			_ => "trace",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_browse_defaults() {
		let cli = Cli::parse_from(["dnssd-browse", "browse", "_http._tcp"]);
		assert_eq!(cli.timeout, 3000);
		assert_eq!(cli.if_index, 0);
		match cli.command {
			Command::Browse { service_type, domain } => {
				assert_eq!(service_type, "_http._tcp");
				assert!(domain.is_empty());
			}
			other => panic!("unexpected command {:?}", other),
		}
	}

	#[test]
	fn test_query_with_type() {
		let cli = Cli::parse_from([
			"dnssd-browse", "query", "printer.local.", "--type", "AAAA", "-vv", "--no-requery",
		]);
		assert_eq!(cli.log_filter(), "debug");
		assert!(!cli.daemon_config().requery);
		match cli.command {
			Command::Query { name, record_type, record_class } => {
				assert_eq!(name, "printer.local.");
				assert_eq!(record_type, "AAAA");
				assert_eq!(record_class, "IN");
			}
			other => panic!("unexpected command {:?}", other),
		}
	}
}
