//! The public hashing context.

use hashwx_asm::{ProgramList, REG_SIZE};

use crate::compiler::{Backend, CODE_SIZE};
use crate::interpreter;
use crate::memory::{ExecutablePage, WritablePage};
use crate::rng::{sip_round, SipHashKey, SipRng};
use crate::Error;

/// Size of the seed accepted by [`HashWx::make`], bytes.
pub const SEED_SIZE: usize = 32;

/// Execution surface selection for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeMode {
    /// Portable interpretation of the program list.
    Interpreted,
    /// Native code emitted by the build target's backend.
    Compiled,
}

/// A HashWX instance: one seed-derived hash function.
///
/// A context is created once, given a function with [`HashWx::make`] and then
/// queried with [`HashWx::exec`] any number of times; `make` may be called
/// again to rebuild the context for another seed. Contexts are independent
/// of each other and freely movable across threads; a single context is not
/// meant for concurrent mutation.
#[derive(Debug)]
pub struct HashWx {
    storage: Storage,
    key: SipHashKey,
}

#[derive(Debug)]
enum Storage {
    Interpreted(Option<Box<ProgramList>>),
    Compiled(CodeState),
}

#[derive(Debug)]
enum CodeState {
    Writable(WritablePage),
    Executable(ExecutablePage),
    /// Transient placeholder while `make` moves the page between
    /// protection states.
    Poisoned,
}

impl HashWx {
    /// Allocate a context for `mode`.
    ///
    /// Requesting [`RuntimeMode::Compiled`] on a build without a native
    /// backend yields [`Error::NotSupported`]; a failed page reservation
    /// yields [`Error::Allocation`].
    pub fn new(mode: RuntimeMode) -> Result<Self, Error> {
        let storage = match mode {
            RuntimeMode::Interpreted => Storage::Interpreted(None),
            RuntimeMode::Compiled => {
                if !Backend::detect().is_native() {
                    return Err(Error::NotSupported);
                }
                Storage::Compiled(CodeState::Writable(WritablePage::new(CODE_SIZE)?))
            }
        };
        Ok(Self {
            storage,
            key: SipHashKey { k0: 0, k1: 0 },
        })
    }

    /// Derive a hash function from a 256-bit seed.
    ///
    /// The seed is read as four little-endian words: the first pair keys the
    /// program generator, the second pair is retained for nonce expansion.
    /// Calling `make` again replaces the function; the operation is
    /// idempotent for a fixed seed.
    pub fn make(&mut self, seed: &[u8; SEED_SIZE]) {
        let generator_key = SipHashKey::from_le_bytes(seed[..16].try_into().expect("seed half"));
        self.key = SipHashKey::from_le_bytes(seed[16..].try_into().expect("seed half"));

        let list = crate::generator::generate(generator_key);
        match &mut self.storage {
            Storage::Interpreted(program) => *program = Some(Box::new(list)),
            Storage::Compiled(code) => {
                let page = match std::mem::replace(code, CodeState::Poisoned) {
                    CodeState::Writable(page) => page,
                    CodeState::Executable(page) => page.make_writable(),
                    CodeState::Poisoned => unreachable!("make never observes a poisoned context"),
                };
                let page = Backend::detect()
                    .compile(&list, page)
                    .expect("a native backend was verified at allocation");
                *code = CodeState::Executable(page);
            }
        }
    }

    /// Hash a 64-bit nonce.
    ///
    /// A pure function of `(seed, nonce)` once [`HashWx::make`] has run.
    ///
    /// # Panics
    ///
    /// Calling `exec` before `make` is a precondition violation and panics.
    pub fn exec(&self, nonce: u64) -> u64 {
        let mut r = [0u64; REG_SIZE];
        let mut rng = SipRng::new(self.key, nonce);
        for reg in r.iter_mut().take(8) {
            *reg = rng.next_u64();
        }
        // The scalar registers carry fixed residues: R8 is 3 mod 8 and
        // R9 is 5 mod 8.
        r[8] = (r[4] & !7) | 3;
        r[9] = (r[7] & !7) | 5;

        match &self.storage {
            Storage::Interpreted(Some(list)) => interpreter::execute(list, &mut r),
            Storage::Compiled(CodeState::Executable(page)) => run_native(page, &mut r),
            Storage::Interpreted(None) | Storage::Compiled(_) => {
                panic!("exec called before make")
            }
        }

        let [r0, r1, r2, r3, r4, r5, r6, r7, _, r9] = &mut r;
        sip_round(r0, r1, r2, r3);
        sip_round(r4, r5, r6, r7);
        *r3 ^ *r7 ^ *r9
    }
}

#[allow(unsafe_code)]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn run_native(page: &ExecutablePage, r: &mut [u64; REG_SIZE]) {
    // The emitters always target the SysV convention on x86-64 (the
    // prologue starts with `mov rcx, rdi`) and AAPCS64 on AArch64.
    #[cfg(target_arch = "x86_64")]
    type ProgramFn = unsafe extern "sysv64" fn(*mut u64);
    #[cfg(target_arch = "aarch64")]
    type ProgramFn = unsafe extern "C" fn(*mut u64);

    // SAFETY: the page holds one complete function emitted by the backend
    // for this target; it only touches the ten words behind the pointer and
    // its own stack frame, and the page stays alive and RX for the call.
    unsafe {
        let func: ProgramFn = std::mem::transmute(page.entry());
        func(r.as_mut_ptr());
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn run_native(_page: &ExecutablePage, _r: &mut [u64; REG_SIZE]) {
    unreachable!("compiled contexts cannot be allocated without a native backend")
}
