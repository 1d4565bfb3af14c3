//! Operating-system backends for live process access
//!
//! Each backend exposes the same `RawProcess` type with the same five
//! primitives. All unsafe FFI is contained here; the rest of the crate only
//! sees [`crate::process::ProcessHandle`].

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::RawProcess;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub use macos::RawProcess;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::RawProcess;

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
mod unsupported;
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub use unsupported::RawProcess;

/// Name of the backend compiled into this build
pub const BACKEND: &str = if cfg!(target_os = "linux") {
    "linux"
} else if cfg!(target_os = "macos") {
    "mach"
} else if cfg!(windows) {
    "win32"
} else {
    "unsupported"
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        #[cfg(target_os = "linux")]
        assert_eq!(BACKEND, "linux");

        #[cfg(windows)]
        assert_eq!(BACKEND, "win32");

        assert!(!BACKEND.is_empty());
    }
}
