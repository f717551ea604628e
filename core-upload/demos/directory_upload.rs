//! Uploads every file of one directory into another directory.
//!
//! ```text
//! cargo run -p core-upload --example directory_upload -- <local-dir> <remote-dir>
//! ```
//!
//! Running it again resumes: files already present remotely are skipped,
//! partial copies are restarted and mismatching files are reported as
//! conflicts.

use bridge_desktop::local_file_handles;
use core_runtime::config::UploadConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_upload::{MassUploadService, UploadStatus};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let mut args = std::env::args().skip(1);
    let (Some(local_dir), Some(remote_dir)) = (args.next(), args.next()) else {
        eprintln!("usage: directory_upload <local-dir> <remote-dir>");
        std::process::exit(2);
    };

    let files = local_file_handles(&local_dir).await?;
    if files.is_empty() {
        println!("nothing to upload in {local_dir}");
        return Ok(());
    }

    let config = UploadConfig::builder().remote_directory(remote_dir).build()?;
    let handle = MassUploadService::spawn(config)?;
    handle.add_files(files).await?;

    let mut snapshots = handle.watch();
    loop {
        let snapshot = snapshots.borrow_and_update().clone();
        println!(
            "{:<20} {:>3}% {}/{} bytes",
            snapshot.status.as_str(),
            snapshot.progress.percent(),
            snapshot.progress.loaded,
            snapshot.progress.total
        );

        let settled = matches!(
            snapshot.status,
            UploadStatus::Waiting
                | UploadStatus::WaitingError
                | UploadStatus::WaitingConflict
                | UploadStatus::ListingFilesError
        );
        if settled {
            if let Some(error) = &snapshot.list_files_error {
                eprintln!("listing failed: {error}");
            }
            for entry in &snapshot.errors {
                eprintln!("{}: {}", entry.file_id, entry.error);
            }
            for file_id in &snapshot.conflicted {
                eprintln!("{file_id}: differs from the remote copy");
            }
            break;
        }
        snapshots.changed().await?;
    }

    handle.shutdown().await?;
    Ok(())
}
