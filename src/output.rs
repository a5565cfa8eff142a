use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL};

use anyhow::Result;

use mdns_dnssd::DaemonConfig;

/// One event observed while listening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
	pub added: bool,
	pub if_index: u32,
	pub name: String,
	pub kind: String,
	pub detail: String,
}

/// Print a summary of what is about to run.
pub fn print_config_summary(target: &str, listen_ms: u64, if_index: u32, config: &DaemonConfig) {
	println!("mDNS Discovery");
	println!("==============");
	println!("Target:         {}", target);
	println!("Listen:         {} ms", listen_ms);
	let interface = if if_index == 0 { "any".to_string() } else { if_index.to_string() };
	println!("Interface:      {}", interface);
	let requery = if config.requery { "yes" } else { "no" };
	println!("Re-query:       {}", requery);
	println!("Jitter:         {}%", config.jitter_percent);
	println!();
}

/// Print the observed events as a formatted table.
pub fn print_results_table(rows: &[ResultRow], headers: [&str; 3]) {
	if rows.is_empty() {
		println!("No answers received.");
		return;
	}

	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Event", "Interface", headers[0], headers[1], headers[2]]);

	for row in rows {
		table.add_row(vec![
			event_label(row.added).to_string(),
			row.if_index.to_string(),
			row.name.clone(),
			row.kind.clone(),
			row.detail.clone(),
		]);
	}

	println!("{table}");
}

/// Write the observed events to a CSV file.
pub fn write_csv(path: &str, rows: &[ResultRow]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	writer.write_record(["event", "if_index", "name", "kind", "detail"])?;
	for row in rows {
		writer.write_record([
			event_label(row.added).to_string(),
			row.if_index.to_string(),
			row.name.clone(),
			row.kind.clone(),
			row.detail.clone(),
		])?;
	}

	writer.flush()?;
	println!("\nResults written to: {}", path);
	Ok(())
}

fn event_label(added: bool) -> &'static str {
	if added { "added" } else { "removed" }
}
