mod cli;
mod output;

use std::str::FromStr;

use anyhow::anyhow;
use clap::Parser;
use hickory_proto::rr::{DNSClass, Record, RecordType};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mdns_dnssd::{CancelHandle, Daemon, Error, Flags, MdnsSocket, DEFAULT_DOMAIN};

use crate::cli::{Cli, Command};
use crate::output::ResultRow;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_level(true)
		.init();

	let config = cli.daemon_config();
	let socket = MdnsSocket::bind(cli.bind_interface)?;
	let daemon = Daemon::start(socket.clone(), config.clone());
	let receiver = socket.spawn_receiver(daemon.clone());

	let cancel = CancelHandle::new();
	let (row_tx, mut rows_rx) = mpsc::unbounded_channel::<ResultRow>();
	let (err_tx, mut errors_rx) = mpsc::unbounded_channel::<Error>();
	let on_error = move |err: Error| {
		let _ = err_tx.send(err);
	};

	let headers = match &cli.command {
		Command::Browse { service_type, domain } => {
			let shown_domain = if domain.is_empty() { DEFAULT_DOMAIN } else { domain.as_str() };
			output::print_config_summary(
				&format!("{}.{}", service_type, shown_domain),
				cli.timeout, cli.if_index, &config,
			);
			daemon.browse(
				&cancel, Flags::NONE, cli.if_index, service_type, domain,
				move |found: bool, _flags: Flags, if_index: u32, instance: &str, service_type: &str, domain: &str| {
					let _ = row_tx.send(ResultRow {
						added: found,
						if_index,
						name: instance.to_string(),
						kind: service_type.to_string(),
						detail: domain.to_string(),
					});
				},
				on_error,
			)?;
			["Instance", "Service Type", "Domain"]
		}
		Command::Query { name, record_type, record_class } => {
			let record_type = RecordType::from_str(record_type)
				.map_err(|e| anyhow!("invalid record type '{}': {}", record_type, e))?;
			let record_class = DNSClass::from_str(record_class)
				.map_err(|e| anyhow!("invalid record class '{}': {}", record_class, e))?;
			output::print_config_summary(
				&format!("{} {} {}", name, record_class, record_type),
				cli.timeout, cli.if_index, &config,
			);
			daemon.query(
				&cancel, Flags::NONE, cli.if_index, name, record_type, record_class,
				move |flags: Flags, if_index: u32, record: Record| {
					let _ = row_tx.send(ResultRow {
						added: flags.contains(Flags::RECORD_ADDED),
						if_index,
						name: record.name().to_string(),
						kind: record.record_type().to_string(),
						detail: format!("{} (ttl {})", record.data(), record.ttl()),
					});
				},
				on_error,
			)?;
			["Name", "Type", "Data"]
		}
	};

	// Listen until the timeout, Ctrl-C, or the transport goes away
	let deadline = tokio::time::sleep(cli.listen_for());
	tokio::pin!(deadline);
	let mut rows = Vec::new();
	loop {
		tokio::select! {
			_ = &mut deadline => break,
			_ = tokio::signal::ctrl_c() => break,
			Some(row) = rows_rx.recv() => rows.push(row),
			Some(err) = errors_rx.recv() => {
				warn!(error = %err, "query failed");
				if err == Error::ChannelClosed {
					break;
				}
			}
		}
	}

	cancel.cancel();
	daemon.shutdown();
	if let Err(e) = receiver.await {
		warn!(error = %e, "receiver task failed");
	}

	output::print_results_table(&rows, headers);

	// Write CSV if requested
	if let Some(path) = &cli.output {
		output::write_csv(path, &rows)?;
	}

	Ok(())
}
