//! HashWX virtual machine: program generation and execution.
//!
//! A HashWX function is derived from a 256-bit seed. The seed yields two
//! SipHash keys: the first drives the deterministic synthesis of a
//! [`ProgramList`](hashwx_asm::ProgramList), the second expands each nonce
//! into the initial register file. Hashing a nonce executes all 32 programs
//! twice (once against registers, once against a 256-slot memory window) and
//! finishes with a SipRound-based mix.
//!
//! Two execution surfaces produce bit-identical results: the portable
//! [`interpreter`] and the per-target [`compiler`] backends, which emit one
//! native function per program list into an executable page.
//!
//! ```no_run
//! use hashwx_vm::{HashWx, RuntimeMode};
//!
//! let mut ctx = HashWx::new(RuntimeMode::Compiled)
//!     .or_else(|_| HashWx::new(RuntimeMode::Interpreted))?;
//! ctx.make(b"this seed will generate a hash\0\0");
//! let hash = ctx.exec(123_456_789);
//! println!("{hash:016x}");
//! # Ok::<(), hashwx_vm::Error>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]
#![deny(unused_crate_dependencies)]

pub mod compiler;
mod context;
mod error;
pub mod generator;
pub mod interpreter;
mod memory;
pub mod rng;

pub use context::{HashWx, RuntimeMode, SEED_SIZE};
pub use error::Error;

#[doc(no_inline)]
pub use hashwx_asm;

// Exercised by the integration tests and benches only.
#[cfg(test)]
use criterion as _;
#[cfg(test)]
use hex as _;
#[cfg(test)]
use rand as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use wasmparser as _;
