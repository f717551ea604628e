//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (`core-upload`, `core-runtime`, `bridge-traits`, `bridge-desktop`).
//! Host applications can depend on `mass-upload-workspace` and enable the
//! documented features without wiring each crate individually.

#[cfg(feature = "core")]
pub use bridge_traits;
#[cfg(feature = "core")]
pub use core_runtime;
#[cfg(feature = "core")]
pub use core_upload;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
