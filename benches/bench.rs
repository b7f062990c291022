use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gaincal::{
    apply_gain_corr,
    constants::{NUM_ANTS, NUM_POLS},
    corrections::{apply_antenna_gains, baseline_gains},
    ndarray::{Array2, Array4},
    store::{
        memory::{MemoryCalHeader, MemoryTelemetry},
        Column, SchemaVersion,
    },
    CorrelatorData, GainCalContextBuilder, Instant,
};

const NUM_TIMESTEPS: i64 = 60;
const NUM_CHANS: usize = 128;

fn get_data() -> CorrelatorData {
    let t0 = Instant::from_gregorian(2017, 9, 10, 18, 0, 0);
    let time = (0..NUM_TIMESTEPS).map(|t| t0.add_secs(t).to_jd()).collect();
    let fghz = (0..NUM_CHANS).map(|c| 1.1 + 0.1 * c as f64).collect();
    CorrelatorData::ones(time, fghz)
}

fn get_ant_gain() -> Array4<f64> {
    Array4::from_shape_fn(
        (NUM_ANTS, NUM_POLS, NUM_CHANS, NUM_TIMESTEPS as usize),
        |(ant, pol, chan, _)| 1.0 + 0.01 * (ant + pol + chan) as f64,
    )
}

fn bench_baseline_gains(crt: &mut Criterion) {
    let ant_gain = get_ant_gain();
    crt.bench_function("baseline_gains", |bch| {
        bch.iter(|| baseline_gains(black_box(ant_gain.view())))
    });
}

fn bench_apply_antenna_gains(crt: &mut Criterion) {
    let data = get_data();
    let ant_gain = get_ant_gain();
    let time_idx: Vec<usize> = (0..NUM_TIMESTEPS as usize).collect();
    crt.bench_function("apply_antenna_gains", |bch| {
        bch.iter(|| {
            let mut corrected = data.clone();
            apply_antenna_gains(&mut corrected, black_box(ant_gain.view()), &time_idx).unwrap();
            corrected
        })
    });
}

fn bench_apply_gain_corr(crt: &mut Criterion) {
    let data = get_data();
    let t0 = Instant::from_gregorian(2017, 9, 10, 18, 0, 0);
    let mut telemetry = MemoryTelemetry::new(SchemaVersion::new("66").unwrap());
    for t in 0..NUM_TIMESTEPS + 62 {
        let h1 = if t < 62 { 5 } else { 11 };
        telemetry.push_antenna_rows(
            t0.add_secs(t - 62),
            &[
                (Column::FemClockMs, [1; NUM_ANTS]),
                (Column::HPolAtteFirst, [h1; NUM_ANTS]),
                (Column::HPolAtteSecond, [3; NUM_ANTS]),
                (Column::VPolAtteFirst, [5; NUM_ANTS]),
                (Column::VPolAtteSecond, [3; NUM_ANTS]),
            ],
        );
    }
    let header = MemoryCalHeader {
        dcm_attn: Some(Array2::zeros((52, NUM_ANTS * NUM_POLS))),
        refcal_time: None,
    };
    let ctx = GainCalContextBuilder::default()
        .telemetry(&telemetry)
        .cal_header(&header)
        .build()
        .unwrap();
    let tref = t0.add_secs(-62);
    crt.bench_function("apply_gain_corr", |bch| {
        bch.iter(|| apply_gain_corr(&ctx, black_box(&data), Some(tref)))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_baseline_gains,
        bench_apply_antenna_gains,
        bench_apply_gain_corr,
);
criterion_main!(benches);
