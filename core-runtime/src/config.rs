//! # Upload Configuration
//!
//! Builder-based configuration for the mass-upload core.
//!
//! ## Overview
//!
//! [`UploadConfig`] carries the injected [`RemoteFileStore`] plus the few
//! tunables of the orchestrator and its service task. The builder validates
//! eagerly so a misconfigured host fails at startup rather than on the first
//! upload.
//!
//! ## Required Dependencies
//!
//! - `RemoteFileStore` - list, upload and delete operations
//!
//! When the `desktop-shims` feature is enabled, [`UploadConfigBuilder::remote_directory`]
//! wires a `DirectoryStore` from `bridge-desktop` instead.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::UploadConfig;
//! use std::sync::Arc;
//!
//! let config = UploadConfig::builder()
//!     .remote_store(Arc::new(MyStore))
//!     .event_buffer_size(256)
//!     .list_on_start(false)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::UploadConfig;
//!
//! // No store injected
//! let config = UploadConfig::builder()
//!     .build()
//!     .expect("Should fail - missing remote store");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::RemoteFileStore;
use std::fmt;
use std::sync::Arc;

/// Default capacity of the service command channel.
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 32;

/// Configuration for a mass-upload session.
#[derive(Clone)]
pub struct UploadConfig {
    /// Remote side of the transfer (required)
    pub remote_store: Arc<dyn RemoteFileStore>,

    /// Capacity of the event bus broadcast channel
    pub event_buffer_size: usize,

    /// Capacity of the service command channel
    pub command_buffer_size: usize,

    /// List remote files as soon as the service starts
    pub list_on_start: bool,
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("remote_store", &"RemoteFileStore { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("command_buffer_size", &self.command_buffer_size)
            .field("list_on_start", &self.list_on_start)
            .finish()
    }
}

impl UploadConfig {
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.command_buffer_size == 0 {
            return Err(Error::Config(
                "Command buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn remote_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "RemoteFileStore".to_string(),
        message: "A RemoteFileStore implementation is required to list, upload and delete files. \
                 Inject one with .remote_store(), or enable the 'desktop-shims' feature and \
                 point .remote_directory() at a target folder."
            .to_string(),
    }
}

/// Builder for [`UploadConfig`].
#[derive(Default)]
pub struct UploadConfigBuilder {
    remote_store: Option<Arc<dyn RemoteFileStore>>,
    event_buffer_size: Option<usize>,
    command_buffer_size: Option<usize>,
    list_on_start: Option<bool>,
}

impl UploadConfigBuilder {
    /// Sets the remote store implementation (required).
    pub fn remote_store(mut self, store: Arc<dyn RemoteFileStore>) -> Self {
        self.remote_store = Some(store);
        self
    }

    /// Uses a local directory as the remote side.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use core_runtime::config::UploadConfig;
    ///
    /// let config = UploadConfig::builder()
    ///     .remote_directory("/mnt/backup/incoming")
    ///     .build()
    ///     .unwrap();
    /// ```
    #[cfg(feature = "desktop-shims")]
    pub fn remote_directory<P: Into<std::path::PathBuf>>(mut self, path: P) -> Self {
        let store: Arc<dyn RemoteFileStore> = Arc::new(bridge_desktop::DirectoryStore::new(path));
        self.remote_store = Some(store);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the command channel capacity of the service task.
    ///
    /// Default: 32
    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = Some(size);
        self
    }

    /// Whether the service lists remote files immediately after spawning.
    ///
    /// Default: true
    pub fn list_on_start(mut self, enabled: bool) -> Self {
        self.list_on_start = Some(enabled);
        self
    }

    /// Builds the final `UploadConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if no remote store was provided
    /// - [`Error::Config`] if a buffer size is zero
    pub fn build(self) -> Result<UploadConfig> {
        let remote_store = self.remote_store.ok_or_else(remote_store_missing_error)?;

        let config = UploadConfig {
            remote_store,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            command_buffer_size: self
                .command_buffer_size
                .unwrap_or(DEFAULT_COMMAND_BUFFER_SIZE),
            list_on_start: self.list_on_start.unwrap_or(true),
        };

        config.validate()?;

        Ok(config)
    }
}
