//! Native code generation.
//!
//! Each backend translates a whole program list into one monolithic function
//! with the C-like signature `fn(r: *mut u64)`: load the register file,
//! run 32 register-sweep program bodies (each spilling the general window
//! onto a 2048-byte stack window), clear the branch counter, run the 32
//! memory-sweep bodies against that window, store the registers back.
//! Emission is infallible; bounds are static and asserted against
//! [`CODE_SIZE`].
//!
//! The emitters are plain byte generators and compile on every host, which
//! keeps them testable off-target; only installing and calling the result
//! is target-gated.

use hashwx_asm::{ProgramList, MEM_MASK, MEM_SIZE};
use static_assertions::const_assert_eq;

use crate::memory::{ExecutablePage, WritablePage};
use crate::Error;

pub mod aarch64;
#[cfg(feature = "wasm-codegen")]
pub mod wasm;
pub mod x86_64;

/// Size of the emitted function's stack window, bytes.
pub(crate) const STACK_WINDOW: u32 = 2048;
const_assert_eq!(MEM_SIZE * 8, STACK_WINDOW as usize);
// The gather mask must select a whole aligned word inside the window; the
// emitters hardcode it in their templates.
const_assert_eq!(MEM_MASK, STACK_WINDOW as u64 - 8);

/// Size of the executable buffer. Each program body expands to a bounded
/// byte count on both targets, so this bound is static.
pub const CODE_SIZE: usize = 8192;

/// Code-generation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// x86-64 native code.
    X86_64,
    /// AArch64 native code.
    AArch64,
    /// WebAssembly module emission for a host embedder; not a native
    /// execution path (see the `wasm` module).
    Wasm,
    /// No backend; only the interpreter is available.
    None,
}

impl Backend {
    /// The backend matching the build target, or [`Backend::None`].
    pub const fn detect() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Self::AArch64
        } else {
            Self::None
        }
    }

    /// Whether this backend produces a directly executable page.
    pub const fn is_native(&self) -> bool {
        matches!(self, Self::X86_64 | Self::AArch64)
    }

    /// Compile `list` into `page` and seal it.
    ///
    /// Returns [`Error::NotSupported`] for the non-native variants.
    pub fn compile(
        &self,
        list: &ProgramList,
        mut page: WritablePage,
    ) -> Result<ExecutablePage, Error> {
        let len = match self {
            Self::X86_64 => x86_64::emit(list, page.as_mut_slice()),
            Self::AArch64 => aarch64::emit(list, page.as_mut_slice()),
            Self::Wasm | Self::None => return Err(Error::NotSupported),
        };
        tracing::debug!(backend = ?self, code_bytes = len, "compiled program list");
        Ok(page.finalize())
    }
}
