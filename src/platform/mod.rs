//! Per-OS input translation
//!
//! All three translators are plain data mappings and compile everywhere; the
//! one matching the build target is picked by [`native_translator`].

use std::sync::Arc;

use crate::input::InputTranslator;

pub mod linux;
pub mod macos;
pub mod windows;

#[cfg(target_os = "macos")]
pub type NativeTranslator = macos::MacTranslator;

#[cfg(target_os = "windows")]
pub type NativeTranslator = windows::WindowsTranslator;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub type NativeTranslator = linux::LinuxTranslator;

/// Translator for the platform this binary was built for
pub fn native_translator() -> Arc<dyn InputTranslator> {
    Arc::new(NativeTranslator::default())
}
