use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hashwx_vm::{HashWx, RuntimeMode, SEED_SIZE};

fn bench_seed(tag: u64) -> [u8; SEED_SIZE] {
    let mut seed = [0u8; SEED_SIZE];
    seed[..8].copy_from_slice(&tag.to_le_bytes());
    seed[8..13].copy_from_slice(b"bench");
    seed
}

fn make(c: &mut Criterion) {
    let mut group = c.benchmark_group("make");

    let mut ctx = HashWx::new(RuntimeMode::Interpreted).unwrap();
    let mut tag = 0u64;
    group.bench_function("interpreted", |b| {
        b.iter(|| {
            tag = tag.wrapping_add(1);
            ctx.make(black_box(&bench_seed(tag)));
        })
    });

    if let Ok(mut ctx) = HashWx::new(RuntimeMode::Compiled) {
        group.bench_function("compiled", |b| {
            b.iter(|| {
                tag = tag.wrapping_add(1);
                ctx.make(black_box(&bench_seed(tag)));
            })
        });
    }

    group.finish();
}

fn exec(c: &mut Criterion) {
    let mut group = c.benchmark_group("exec");

    let mut ctx = HashWx::new(RuntimeMode::Interpreted).unwrap();
    ctx.make(&bench_seed(1));
    let mut nonce = 0u64;
    group.bench_function("interpreted", |b| {
        b.iter(|| {
            nonce = nonce.wrapping_add(1);
            black_box(ctx.exec(black_box(nonce)))
        })
    });

    if let Ok(mut ctx) = HashWx::new(RuntimeMode::Compiled) {
        ctx.make(&bench_seed(1));
        group.bench_function("compiled", |b| {
            b.iter(|| {
                nonce = nonce.wrapping_add(1);
                black_box(ctx.exec(black_box(nonce)))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, make, exec);
criterion_main!(benches);
