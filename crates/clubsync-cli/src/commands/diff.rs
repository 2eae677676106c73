use clubsync_core::SyncSettings;

use crate::commands::common::{format_diff_lines, open_reconciler};
use crate::error::CliError;

pub async fn run_diff(settings: &SyncSettings, all: bool, as_json: bool) -> Result<(), CliError> {
    let reconciler = open_reconciler(settings).await?;
    let report = reconciler.compare().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_diff_lines(&report, all) {
        println!("{line}");
    }
    Ok(())
}
