//! Randomized cross-check of the two execution surfaces.
//!
//! The compiled function must match the interpreter bit for bit on every
//! `(seed, nonce)` pair. A hundred seeds at a thousand nonces each gives
//! 100_000 pairs per run without re-deriving the program list per pair.

use hashwx_vm::{HashWx, RuntimeMode, SEED_SIZE};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

const SEEDS: usize = 100;
const NONCES_PER_SEED: usize = 1000;

#[test]
fn interpreter_and_compiler_agree() {
    let mut compiled = match HashWx::new(RuntimeMode::Compiled) {
        Ok(ctx) => ctx,
        Err(hashwx_vm::Error::NotSupported) => return,
        Err(err) => panic!("context allocation failed: {err}"),
    };
    let mut interpreted = HashWx::new(RuntimeMode::Interpreted).unwrap();

    // Deterministic randomness keeps failures reproducible.
    let mut rng = StdRng::seed_from_u64(0x68617368_77780001);

    for round in 0..SEEDS {
        let mut seed = [0u8; SEED_SIZE];
        rng.fill_bytes(&mut seed);
        compiled.make(&seed);
        interpreted.make(&seed);

        for _ in 0..NONCES_PER_SEED {
            let nonce = rng.gen::<u64>();
            assert_eq!(
                interpreted.exec(nonce),
                compiled.exec(nonce),
                "diverged in round {round} for nonce {nonce:#x}",
            );
        }
    }
}

#[test]
fn surfaces_agree_on_edge_nonces() {
    let mut compiled = match HashWx::new(RuntimeMode::Compiled) {
        Ok(ctx) => ctx,
        Err(_) => return,
    };
    let mut interpreted = HashWx::new(RuntimeMode::Interpreted).unwrap();

    let seed = [0x5au8; SEED_SIZE];
    compiled.make(&seed);
    interpreted.make(&seed);
    for nonce in [0, 1, u64::MAX, u64::MAX - 1, 1 << 63, 0x0123_4567_89ab_cdef] {
        assert_eq!(interpreted.exec(nonce), compiled.exec(nonce));
    }
}
