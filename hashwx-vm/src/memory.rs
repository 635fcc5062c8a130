//! W^X lifecycle of the executable code page.
//!
//! The two protection states are distinct types: a [`WritablePage`] exists
//! while a function is being emitted, an [`ExecutablePage`] afterwards.
//! Moving between them consumes the handle, so a page can never be writable
//! and executable at the same time. A failed protection flip means the host
//! forbids executable anonymous memory altogether; per the error contract
//! that is fatal, not recoverable.

#![allow(unsafe_code)]

use memmap2::{Mmap, MmapMut};

use crate::Error;

/// An anonymous read-write page under construction.
#[derive(Debug)]
pub struct WritablePage {
    map: MmapMut,
}

/// A finalized read-execute page.
#[derive(Debug)]
pub struct ExecutablePage {
    map: Mmap,
}

impl WritablePage {
    /// Reserve `len` bytes of anonymous read-write memory.
    pub fn new(len: usize) -> Result<Self, Error> {
        let map = MmapMut::map_anon(len).map_err(Error::Allocation)?;
        Ok(Self { map })
    }

    /// The writable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.map
    }

    /// Flip the page to read-execute.
    ///
    /// # Panics
    ///
    /// A protection flip that fails indicates W^X policy misconfiguration
    /// on the host and is unrecoverable.
    pub fn finalize(self) -> ExecutablePage {
        let map = self
            .map
            .make_exec()
            .expect("flipping a code page to RX must not fail");
        flush_instruction_cache(&map);
        ExecutablePage { map }
    }
}

impl ExecutablePage {
    /// Flip the page back to read-write for re-emission.
    ///
    /// # Panics
    ///
    /// See [`WritablePage::finalize`]; the same policy contract applies.
    pub fn make_writable(self) -> WritablePage {
        let map = self
            .map
            .make_mut()
            .expect("flipping a code page to RW must not fail");
        WritablePage { map }
    }

    /// Entry point of the emitted function.
    pub fn entry(&self) -> *const u8 {
        self.map.as_ptr()
    }
}

// Mappings flipped to RX with mprotect keep stale instruction cache lines on
// AArch64; the compiler runtime exposes the required maintenance operation.
#[cfg(target_arch = "aarch64")]
fn flush_instruction_cache(map: &Mmap) {
    extern "C" {
        fn __clear_cache(start: *mut core::ffi::c_char, end: *mut core::ffi::c_char);
    }
    let range = map.as_ptr_range();
    unsafe {
        __clear_cache(
            range.start.cast_mut().cast(),
            range.end.cast_mut().cast(),
        );
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn flush_instruction_cache(_map: &Mmap) {}
