//! Shared decode-device registry.
//!
//! Several subsystems (the video renderer, screenshot paths, filters) want
//! to reuse one decode-device context instead of opening their own display
//! connections. The registry is an explicit, injected service: sessions add
//! their device handle on creation and remove it on destruction, and never
//! touch entries they did not add.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::DeviceHandle;

/// One advertised device context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    /// The shared device context handle
    pub device: DeviceHandle,
    /// Name of the driver that owns the entry
    pub driver: &'static str,
}

/// Process-wide registry of decode-device contexts.
///
/// Cheap to clone; clones share the same entry list. Interior mutability via
/// `parking_lot::Mutex` so callers hold `Arc<DeviceRegistry>` or a plain
/// clone, whichever fits their ownership story.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Arc<Mutex<Vec<RegistryEntry>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a device context. Re-adding the same device is a no-op,
    /// so a session may call this unconditionally.
    pub fn add(&self, entry: RegistryEntry) {
        let mut entries = self.entries.lock();
        if !entries.iter().any(|e| e.device == entry.device) {
            entries.push(entry);
        }
    }

    /// Withdraws a device context. Idempotent; removing an absent device is
    /// a no-op so teardown paths can always call it.
    pub fn remove(&self, device: DeviceHandle) {
        self.entries.lock().retain(|e| e.device != device);
    }

    /// Whether a device is currently advertised.
    pub fn contains(&self, device: DeviceHandle) -> bool {
        self.entries.lock().iter().any(|e| e.device == device)
    }

    /// Snapshot of the current entries.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries.lock().clone()
    }
}
