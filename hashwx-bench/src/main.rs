//! Operational driver for HashWX: a multi-threaded throughput/difficulty
//! benchmark and a raw PRNG stream for external statistical batteries.

use std::io::Write;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hashwx_vm::rng::{SipHashKey, SipRng};
use hashwx_vm::{HashWx, RuntimeMode, SEED_SIZE};

/// Seed-expansion key of the benchmark driver; a fixed constant so runs are
/// comparable across hosts and implementations.
const WORKER_KEY: SipHashKey = SipHashKey {
    k0: 0xb443266e0c61253a,
    k1: 0x85cfeef0bcbdb1e9,
};

#[derive(Parser)]
#[command(about, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hash a range of seeds and report throughput and best difficulty.
    Run(RunArgs),
    /// Expose exec as a PRNG over sequential nonces, writing 32-bit words
    /// to stdout for piping into a statistical test battery.
    Stream(StreamArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Difficulty target, in thousands; hashes below u64::MAX / (diff *
    /// 1000) are reported as found.
    #[arg(long, default_value_t = i32::MAX as u64)]
    diff: u64,
    /// First seed index.
    #[arg(long, default_value_t = 0)]
    start: u64,
    /// Number of seed indices to cover.
    #[arg(long, default_value_t = 10_000)]
    seeds: u64,
    /// Nonces hashed per seed.
    #[arg(long, default_value_t = 512)]
    nonces: u64,
    /// Worker threads; each owns one context.
    #[arg(long, default_value_t = 1)]
    threads: u64,
    /// Force the interpreted surface.
    #[arg(long)]
    interpret: bool,
}

#[derive(Args)]
struct StreamArgs {
    /// Seed selector mixed into a fixed seed template; must be non-zero.
    #[arg(long)]
    seed: i32,
    /// Stream the high half of each hash instead of the low half.
    #[arg(long)]
    hi: bool,
    /// Stop after this many 32-bit words (default: run until the pipe
    /// closes).
    #[arg(long)]
    count: Option<u64>,
    /// Force the interpreted surface.
    #[arg(long)]
    interpret: bool,
}

#[derive(Default)]
struct WorkerReport {
    total_hashes: u64,
    best_hash: u64,
    hash_sum: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Stream(args) => stream(args),
    }
}

fn allocate(interpret: bool) -> Result<HashWx> {
    if interpret {
        return Ok(HashWx::new(RuntimeMode::Interpreted)?);
    }
    match HashWx::new(RuntimeMode::Compiled) {
        Ok(ctx) => Ok(ctx),
        Err(hashwx_vm::Error::NotSupported) => {
            bail!("compiled mode not supported on this target; try --interpret")
        }
        Err(err) => Err(err).context("context allocation failed"),
    }
}

/// Expand a seed index into the 32-byte seed hashed by the workers.
fn expand_seed(index: u64) -> [u8; SEED_SIZE] {
    let mut rng = SipRng::new(WORKER_KEY, index);
    let mut seed = [0u8; SEED_SIZE];
    for chunk in seed.chunks_exact_mut(8) {
        chunk.copy_from_slice(&rng.next_u64().to_le_bytes());
    }
    seed
}

fn run(args: RunArgs) -> Result<()> {
    let threads = args.threads.max(1);
    let diff_ex = args.diff.saturating_mul(1000).max(1);
    let threshold = u64::MAX / diff_ex;
    let seeds_end = args.start + args.seeds;

    println!(
        "Interpret: {}, Target diff.: {diff_ex}, Threads: {threads}",
        u8::from(args.interpret)
    );
    println!(
        "Testing seeds {}-{} with {} nonces each ...",
        args.start,
        seeds_end.saturating_sub(1),
        args.nonces
    );

    let started = Instant::now();
    let reports: Vec<Result<WorkerReport>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|id| {
                let args = &args;
                scope.spawn(move || worker(id, threads, seeds_end, threshold, args))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    });
    let elapsed = started.elapsed().as_secs_f64();

    let mut total_hashes = 0u64;
    let mut best_hash = u64::MAX;
    let mut hash_sum = 0u64;
    for report in reports {
        let report = report?;
        total_hashes += report.total_hashes;
        hash_sum ^= report.hash_sum;
        best_hash = best_hash.min(report.best_hash);
    }

    println!("Total hashes: {total_hashes}");
    println!("{:.6} hashes/sec.", total_hashes as f64 / elapsed);
    println!("{:.6} seeds/sec.", args.seeds as f64 / elapsed);
    println!(
        "Best hash: {best_hash:016x} (diff: {})",
        u64::MAX / best_hash.max(1)
    );
    println!("Hash sum: {hash_sum:016x}");
    Ok(())
}

fn worker(
    id: u64,
    step: u64,
    seeds_end: u64,
    threshold: u64,
    args: &RunArgs,
) -> Result<WorkerReport> {
    let mut ctx = allocate(args.interpret)?;
    let mut report = WorkerReport {
        best_hash: u64::MAX,
        ..WorkerReport::default()
    };

    let mut seed_index = args.start + id;
    while seed_index < seeds_end {
        ctx.make(&expand_seed(seed_index));
        for nonce in 0..args.nonces {
            let hash = ctx.exec(nonce);
            report.hash_sum ^= hash;
            report.best_hash = report.best_hash.min(hash);
            if hash < threshold {
                println!("[thread {id:2}] Hash ({seed_index:5}, {nonce:5}) below threshold: {hash}");
            }
        }
        report.total_hashes += args.nonces;
        seed_index += step;
    }
    Ok(report)
}

fn stream(args: StreamArgs) -> Result<()> {
    if args.seed == 0 {
        bail!("invalid seed");
    }
    let mut seed = [0u8; SEED_SIZE];
    seed[..31].copy_from_slice(b"0000-TestU01-hashwx-crush-seed1");
    seed[..4].copy_from_slice(&args.seed.to_le_bytes());

    let mut ctx = allocate(args.interpret)?;
    ctx.make(&seed);
    tracing::info!(seed = args.seed, hi = args.hi, "streaming hash words");

    let stdout = std::io::stdout().lock();
    let mut out = std::io::BufWriter::new(stdout);
    let mut nonce = 0u64;
    loop {
        if let Some(count) = args.count {
            if nonce >= count {
                break;
            }
        }
        let hash = ctx.exec(nonce);
        let word = if args.hi {
            (hash >> 32) as u32
        } else {
            hash as u32
        };
        if let Err(err) = out.write_all(&word.to_le_bytes()) {
            if err.kind() == std::io::ErrorKind::BrokenPipe {
                break;
            }
            return Err(err).context("writing stream output");
        }
        nonce += 1;
    }
    out.flush().ok();
    Ok(())
}
