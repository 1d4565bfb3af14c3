//! Temporary protection changes around writes

use crate::core::types::{Address, MemoryError, MemoryResult, NativeProtection, Protection, Region};
use crate::process::ProcessMemory;
use tracing::{debug, warn};

/// One protection change made on the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionChange {
    /// Address where protection was changed
    pub address: Address,
    /// Size of the range changed
    pub size: u64,
    /// Protection before the change, as the platform reported it
    pub old_protection: NativeProtection,
    /// Protection after the change
    pub new_protection: Protection,
}

/// Changes and restores memory protection on a target process
pub struct ProtectionManager<'a, P: ProcessMemory + ?Sized> {
    handle: &'a P,
}

impl<'a, P: ProcessMemory + ?Sized> ProtectionManager<'a, P> {
    pub fn new(handle: &'a P) -> Self {
        ProtectionManager { handle }
    }

    /// Sets the protection of `[address, address + size)` and remembers the
    /// protection it replaces. `current` is used only when the platform does
    /// not report the replaced value itself.
    pub fn change_protection(
        &self,
        address: Address,
        size: u64,
        current: Protection,
        new_protection: Protection,
    ) -> MemoryResult<ProtectionChange> {
        if size == 0 {
            return Err(MemoryError::InvalidParameter(
                "Size cannot be zero".to_string(),
            ));
        }

        let old_protection = self
            .handle
            .protect_memory(address, size, new_protection.into())?
            .unwrap_or(NativeProtection::Portable(current));
        debug!(%address, size, from = %old_protection, to = %new_protection, "Changed protection");

        Ok(ProtectionChange {
            address,
            size,
            old_protection,
            new_protection,
        })
    }

    /// Adds write permission to every part of `[start, end)` covered by a
    /// region that lacks it. Regions must cover the range; those already
    /// writable are left alone. If any change fails, the changes made so far
    /// are rolled back.
    pub fn make_writable(
        &self,
        regions: &[Region],
        start: Address,
        end: Address,
    ) -> MemoryResult<Vec<ProtectionChange>> {
        let mut changes = Vec::new();

        for region in regions.iter().filter(|r| !r.is_writable()) {
            let from = region.base.max(start);
            let to = region.end().min(end);
            let Some(size) = to.offset_from(from).filter(|&size| size > 0) else {
                continue;
            };

            let elevated = region.protection.union(Protection::WRITE);
            match self.change_protection(from, size, region.protection, elevated) {
                Ok(change) => changes.push(change),
                Err(e) => {
                    // best effort, the original error is what the caller needs
                    let _ = self.restore(&changes);
                    return Err(e);
                }
            }
        }

        Ok(changes)
    }

    /// Puts every changed range back to its old protection, in reverse order.
    /// All changes are attempted; the first failure is returned.
    pub fn restore(&self, changes: &[ProtectionChange]) -> MemoryResult<()> {
        let mut first_error = None;

        for change in changes.iter().rev() {
            if let Err(e) =
                self.handle
                    .protect_memory(change.address, change.size, change.old_protection)
            {
                warn!(address = %change.address, error = %e, "Failed to restore protection");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
