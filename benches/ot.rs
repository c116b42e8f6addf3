use std::time::Instant;

use criterion::{BenchmarkGroup, BenchmarkId, Criterion, measurement::WallTime};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tessera::{
    channel::SimpleChannel,
    ot::{CoteReceiver, CoteSender, OtConfig},
};
use tokio::runtime::Runtime;

pub fn ot_benchmark(c: &mut Criterion) {
    // Default runtime for "full" feature is multi-threaded
    let rt = Runtime::new().unwrap();

    let ot_count_exponents = [10, 13, 16];
    let mut g = c.benchmark_group("ot");
    for exp in ot_count_exponents {
        let ot_count = 2_usize.pow(exp);
        let bench_id = BenchmarkId::new("IKNP correlated OTs", ot_count);
        g.throughput(criterion::Throughput::Elements(ot_count as u64));
        bench_cotes(&mut g, &rt, bench_id, ot_count);
    }
}

fn bench_cotes(
    g: &mut BenchmarkGroup<'_, WallTime>,
    rt: &Runtime,
    bench_id: BenchmarkId,
    count: usize,
) {
    g.bench_function(bench_id, |b| {
        b.to_async(rt).iter_custom(|iters| {
            // the base OTs are set up outside of the measured time
            let [ch1, ch2]: [SimpleChannel; 2] = SimpleChannel::channels(2)
                .try_into()
                .expect("parties is 2");
            let mut rng = ChaCha20Rng::seed_from_u64(42);
            let choices: Vec<bool> = (0..count).map(|_| rng.random()).collect();

            async move {
                let config = OtConfig::default();
                let mut rng1 = ChaCha20Rng::seed_from_u64(1);
                let mut rng2 = ChaCha20Rng::seed_from_u64(2);
                let (mut sender, mut receiver) = tokio::try_join!(
                    CoteSender::setup(&ch1, 0, 1, config, &mut rng1),
                    CoteReceiver::setup(&ch2, 1, 0, config, &mut rng2),
                )
                .expect("base OTs failed");
                let now = Instant::now();
                for _ in 0..iters {
                    tokio::try_join!(
                        sender.extend(&ch1, count),
                        receiver.extend(&ch2, &choices)
                    )
                    .expect("OTs failed");
                }
                now.elapsed()
            }
        })
    });
}
