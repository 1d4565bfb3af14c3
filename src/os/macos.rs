//! macOS backend: Mach task port and `mach_vm_*` calls

use crate::core::types::{
    Address, MemoryError, MemoryResult, NativeProtection, ProcessId, Protection, RegionQuery,
    ShareMode, UserTag,
};
use mach2::kern_return::{kern_return_t, KERN_SUCCESS};
use mach2::mach_port::mach_port_deallocate;
use mach2::message::mach_msg_type_number_t;
use mach2::port::{mach_port_name_t, MACH_PORT_NULL};
use mach2::traps::{mach_task_self, task_for_pid};
use mach2::vm::{mach_vm_protect, mach_vm_read_overwrite, mach_vm_region_recurse, mach_vm_write};
use mach2::vm_prot::{vm_prot_t, VM_PROT_EXECUTE, VM_PROT_READ, VM_PROT_WRITE};
use mach2::vm_region::{vm_region_recurse_info_t, vm_region_submap_info_64};
use mach2::vm_types::{mach_vm_address_t, mach_vm_size_t, natural_t, vm_offset_t};
use std::mem;

const KERN_PROTECTION_FAILURE: kern_return_t = 2;

fn mach_error(call: &str, code: kern_return_t) -> String {
    format!("{} failed with kern_return {}", call, code)
}

fn protection_from_vm(prot: vm_prot_t) -> Protection {
    Protection::from_flags(
        prot & VM_PROT_READ != 0,
        prot & VM_PROT_WRITE != 0,
        prot & VM_PROT_EXECUTE != 0,
    )
}

fn vm_from_protection(protection: Protection) -> vm_prot_t {
    let mut prot = 0;
    if protection.is_readable() {
        prot |= VM_PROT_READ;
    }
    if protection.is_writable() {
        prot |= VM_PROT_WRITE;
    }
    if protection.is_executable() {
        prot |= VM_PROT_EXECUTE;
    }
    prot
}

/// Task port of an opened process, released on drop
#[derive(Debug)]
pub struct RawProcess {
    task: mach_port_name_t,
    pid: ProcessId,
}

impl RawProcess {
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let mut task: mach_port_name_t = MACH_PORT_NULL;
        let result = unsafe { task_for_pid(mach_task_self(), pid as i32, &mut task) };
        if result != KERN_SUCCESS {
            return Err(MemoryError::access_denied(pid, mach_error("task_for_pid", result)));
        }
        Ok(RawProcess { task, pid })
    }

    pub fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        let mut actual: mach_vm_size_t = 0;
        let result = unsafe {
            mach_vm_read_overwrite(
                self.task,
                address.as_u64(),
                buffer.len() as mach_vm_size_t,
                buffer.as_mut_ptr() as mach_vm_address_t,
                &mut actual,
            )
        };
        if result != KERN_SUCCESS {
            return Err(MemoryError::read_failed(address, mach_error("mach_vm_read_overwrite", result)));
        }
        Ok(actual as usize)
    }

    pub fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        let result = unsafe {
            mach_vm_write(
                self.task,
                address.as_u64(),
                data.as_ptr() as vm_offset_t,
                data.len() as mach_msg_type_number_t,
            )
        };
        if result != KERN_SUCCESS {
            return Err(MemoryError::write_failed(address, mach_error("mach_vm_write", result)));
        }
        Ok(data.len())
    }

    /// `mach_vm_protect` does not report the old value. Mach protections are
    /// plain `r/w/x`, so the caller's portable copy restores it exactly.
    pub fn protect(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        let prot = match protection {
            NativeProtection::Portable(protection) => vm_from_protection(protection),
            NativeProtection::Raw(raw) => raw as vm_prot_t,
        };
        let result = unsafe { mach_vm_protect(self.task, address.as_u64(), size, 0, prot) };
        match result {
            KERN_SUCCESS => Ok(None),
            KERN_PROTECTION_FAILURE => Err(MemoryError::protection_failed(
                address,
                "requested protection exceeds the region's maximum",
            )),
            code => Err(MemoryError::protection_failed(address, mach_error("mach_vm_protect", code))),
        }
    }

    pub fn query(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery> {
        let mut base: mach_vm_address_t = address.as_u64();
        let mut size: mach_vm_size_t = 0;
        let mut nesting: natural_t = depth;
        let mut info: vm_region_submap_info_64 = unsafe { mem::zeroed() };
        let mut count = (mem::size_of::<vm_region_submap_info_64>() / mem::size_of::<natural_t>())
            as mach_msg_type_number_t;

        let result = unsafe {
            mach_vm_region_recurse(
                self.task,
                &mut base,
                &mut size,
                &mut nesting,
                &mut info as *mut _ as vm_region_recurse_info_t,
                &mut count,
            )
        };
        if result != KERN_SUCCESS {
            return Err(MemoryError::RegionNotFound(address.to_string()));
        }

        // The info struct is packed; copy fields out by value
        let protection = info.protection;
        let max_protection = info.max_protection;
        let user_tag = info.user_tag;
        let share_mode = info.share_mode;
        let is_submap = info.is_submap;

        Ok(RegionQuery {
            base: Address::new(base),
            size,
            depth: nesting,
            is_submap: is_submap != 0,
            user_tag: UserTag(user_tag),
            protection: protection_from_vm(protection),
            max_protection: protection_from_vm(max_protection),
            share_mode: ShareMode::from_raw(share_mode),
        })
    }
}

impl Drop for RawProcess {
    fn drop(&mut self) {
        if self.task != MACH_PORT_NULL {
            unsafe {
                mach_port_deallocate(mach_task_self(), self.task);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_protection_mapping() {
        assert_eq!(protection_from_vm(VM_PROT_READ | VM_PROT_WRITE), Protection::READ_WRITE);
        assert_eq!(vm_from_protection(Protection::READ_EXECUTE), VM_PROT_READ | VM_PROT_EXECUTE);
        assert_eq!(protection_from_vm(0), Protection::NONE);
    }
}
