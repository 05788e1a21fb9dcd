use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use riscv_asm_emulator::{
    BufferConsole, Emulator, EmulatorConfig, SourceFile, StopHandle, assemble,
};

const COUNTDOWN: &str = "
    li t0, 100000
loop:
    addi t0, t0, -1
    bnez t0, loop
    li a7, 10
    ecall
";

/// A data segment of random words and a loop summing them.
fn random_sum_program(len: usize) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    let words: Vec<String> = (0..len)
        .map(|_| rng.random_range(-2048..2048).to_string())
        .collect();

    format!(
        ".data\narr: .word {}\n.text\n\
         la t0, arr\nli t1, {len}\nli a0, 0\n\
         sum: lw t2, 0(t0)\nadd a0, a0, t2\naddi t0, t0, 4\naddi t1, t1, -1\nbnez t1, sum\n\
         li a7, 10\necall\n",
        words.join(", ")
    )
}

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let big = random_sum_program(4096);

    group.bench_function("countdown", |b| {
        b.iter(|| black_box(assemble(&[SourceFile::new("main.s", COUNTDOWN)]).unwrap()))
    });
    group.bench_function("data_4096_words", |b| {
        b.iter(|| black_box(assemble(&[SourceFile::new("main.s", &big)]).unwrap()))
    });
    group.finish();
}

fn bench_emulator_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("emulator_run");
    group.sample_size(20);

    let countdown = assemble(&[SourceFile::new("main.s", COUNTDOWN)]).unwrap();
    let summing = assemble(&[SourceFile::new("main.s", &random_sum_program(1024))]).unwrap();

    for (name, program, history) in [
        ("countdown_no_history", &countdown, 0),
        ("countdown_with_history", &countdown, 1000),
        ("sum_1024_with_history", &summing, 1000),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let config = EmulatorConfig::new().history_capacity(history);
                let mut emu = Emulator::with_config(program.clone(), BufferConsole::new(), config);
                black_box(emu.run_to_end(&StopHandle::new()))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_assemble, bench_emulator_run);
criterion_main!(benches);
