//! `prsync sync` command - one run from the command line.

use std::path::Path;

use anyhow::{Result, bail};
use prsync_core::{StorageUri, SyncRequest};

use crate::output;
use crate::pipeline::{Pipeline, SyncRunner};

/// Run the sync command.
pub fn run(config_path: &Path, storage_uri: &str, owner: &str, repo: &str, json: bool) -> Result<()> {
    let source = StorageUri::parse(storage_uri)?;
    let request = SyncRequest::new(owner, repo)?;
    let config = super::load_config(config_path)?;
    let pipeline = Pipeline::new(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(pipeline.sync(source, request)) {
        Ok(success) => {
            if json {
                output::essential(&serde_json::to_string_pretty(&success)?);
                return Ok(());
            }
            output::success(&format!(
                "Opened pull request from {} ({} applied, {} skipped)",
                success.branch, success.files_applied, success.files_skipped
            ));
            output::essential(&success.pull_request_url);
            Ok(())
        }
        Err(failure) => {
            if json {
                output::essential(&serde_json::to_string_pretty(&failure)?);
            }
            if let Some(branch) = &failure.branch {
                output::warn(&format!(
                    "Branch {branch} was left in place with {} file(s) applied",
                    failure.files_applied
                ));
            }
            bail!(
                "sync failed during {} [{}]: {}",
                output::stage_label(failure.stage),
                output::kind_label(failure.kind),
                failure.message
            )
        }
    }
}
