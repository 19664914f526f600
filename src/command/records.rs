use anyhow::{Context, Result};
use std::path::Path;

use agent_chat::records::LinkRecordStore;

use crate::cli::args::RecordsAction;

pub fn run_records(data_dir: &Path, action: RecordsAction) -> Result<()> {
    let store = LinkRecordStore::new(data_dir)
        .with_context(|| format!("Failed to open link records in {:?}", data_dir))?;

    match action {
        RecordsAction::Add { url } => match store.add(&url)? {
            Some(record) => println!("✅ Saved {} ({})", record.url, record.status),
            None => println!("⚠️  Nothing to save: the URL is empty."),
        },
        RecordsAction::List => {
            let records = store.list()?;
            if records.is_empty() {
                println!("No saved links.");
                return Ok(());
            }
            println!("{:>3}  {:<8}  {:<20}  {:<15}  URL", "#", "STATUS", "SAVED", "IP");
            for (i, record) in records.iter().enumerate() {
                println!(
                    "{:>3}  {:<8}  {:<20}  {:<15}  {}",
                    i + 1,
                    record.status.as_str(),
                    record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    record.ip,
                    record.url
                );
            }
        }
        RecordsAction::Status { index, status } => {
            if index == 0 {
                anyhow::bail!("Record numbers start at 1");
            }
            let record = store.set_status(index - 1, status)?;
            println!("✅ #{} {} is now {}", index, record.url, record.status);
        }
    }

    Ok(())
}
