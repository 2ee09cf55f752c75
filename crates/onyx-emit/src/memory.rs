//! Executable page management.
//!
//! Anonymous mappings are filled while writable, then flipped to
//! read-execute. Never writable and executable at the same time.

#[cfg(unix)]
mod imp {
    use std::ffi::c_void;
    use std::num::NonZeroUsize;
    use std::ptr::NonNull;

    use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};

    use crate::error::EmitError;

    /// A read-execute mapping holding one compiled block.
    pub struct ExecutableMemory {
        region: NonNull<c_void>,
        size: usize,
    }

    impl ExecutableMemory {
        /// Map `code` into fresh pages and make them executable.
        pub fn new(code: &[u8]) -> Result<Self, EmitError> {
            // The kernel rounds lengths up to whole pages.
            let size = code.len().max(1);
            let size_nz = NonZeroUsize::new(size).expect("size is nonzero");

            let region = unsafe {
                mmap_anonymous(
                    None,
                    size_nz,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_PRIVATE,
                )
            }
            .map_err(|e| EmitError::Map(e.to_string()))?;

            unsafe {
                std::ptr::copy_nonoverlapping(code.as_ptr(), region.as_ptr().cast::<u8>(), code.len());
                mprotect(region, size, ProtFlags::PROT_READ | ProtFlags::PROT_EXEC)
                    .map_err(|e| EmitError::Map(e.to_string()))?;
            }
            flush_icache(region.as_ptr().cast(), code.len());

            Ok(Self { region, size })
        }

        /// Entry point of the mapped code.
        pub fn as_ptr(&self) -> *const u8 {
            self.region.as_ptr().cast()
        }

        pub fn len(&self) -> usize {
            self.size
        }

        pub fn is_empty(&self) -> bool {
            self.size == 0
        }
    }

    impl Drop for ExecutableMemory {
        fn drop(&mut self) {
            unsafe {
                let _ = munmap(self.region, self.size);
            }
        }
    }

    /// Make freshly written code visible to the instruction stream. The
    /// data and instruction caches are not coherent on AArch64.
    #[cfg(target_arch = "aarch64")]
    fn flush_icache(start: *const u8, len: usize) {
        use std::arch::asm;
        const LINE: usize = 64;
        let begin = (start as usize) & !(LINE - 1);
        let end = start as usize + len;
        unsafe {
            let mut p = begin;
            while p < end {
                asm!("dc cvau, {0}", in(reg) p);
                p += LINE;
            }
            asm!("dsb ish");
            let mut p = begin;
            while p < end {
                asm!("ic ivau, {0}", in(reg) p);
                p += LINE;
            }
            asm!("dsb ish", "isb");
        }
    }

    #[cfg(not(target_arch = "aarch64"))]
    fn flush_icache(_start: *const u8, _len: usize) {}
}

#[cfg(not(unix))]
mod imp {
    use crate::error::EmitError;

    /// Fallback for non-unix hosts: code is held but cannot be executed.
    pub struct ExecutableMemory {
        code: Vec<u8>,
    }

    impl ExecutableMemory {
        pub fn new(code: &[u8]) -> Result<Self, EmitError> {
            Ok(Self { code: code.to_vec() })
        }

        pub fn as_ptr(&self) -> *const u8 {
            self.code.as_ptr()
        }

        pub fn len(&self) -> usize {
            self.code.len()
        }

        pub fn is_empty(&self) -> bool {
            self.code.is_empty()
        }
    }
}

pub use imp::ExecutableMemory;

impl std::fmt::Debug for ExecutableMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutableMemory")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_and_reads_back() {
        let code = [0xC3u8, 0x90, 0x90];
        let mem = ExecutableMemory::new(&code).unwrap();
        let mapped = unsafe { std::slice::from_raw_parts(mem.as_ptr(), 3) };
        assert_eq!(mapped, &code);
    }
}
