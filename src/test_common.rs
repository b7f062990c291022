//! Synthetic stores and records shared by the unit tests.

use ndarray::{Array2, Array4};

use crate::{
    attn_curve::AttenuationMeasurement,
    constants::{NUM_ANTS, NUM_DCM_SLOTS, NUM_MEASURED_LEVELS, NUM_POLS},
    context::{GainCalContext, GainCalContextBuilder},
    store::{
        memory::{MemoryAttnStore, MemoryCalHeader, MemoryScanLocator, MemoryTelemetry, Value},
        Column, SchemaVersion, Table,
    },
    time::Instant,
    types::CorrelatorData,
};

/// 2017-09-10 18:00:00 UTC
pub const T0: Instant = Instant::from_ticks(3_587_911_200);

/// A store with `num_times` seconds of front-end records from [`T0`], where
/// `attn(t, ant)` gives `[h1, h2, v1, v2]`, `level(t, ant)` gives
/// `[h_level, v_level]` and `live(t, ant)` whether the record is valid.
pub fn fem_store_with_liveness(
    num_times: usize,
    attn: impl Fn(usize, usize) -> [i64; 4],
    level: impl Fn(usize, usize) -> [i64; 2],
    live: impl Fn(usize, usize) -> bool,
) -> MemoryTelemetry {
    let mut store = MemoryTelemetry::new(SchemaVersion::new("66").unwrap());
    for t in 0..num_times {
        let lane = |f: &dyn Fn(usize) -> i64| -> [i64; NUM_ANTS] {
            std::array::from_fn(f)
        };
        let columns = [
            (Column::FemClockMs, lane(&|ant| if live(t, ant) { 1_000 + t as i64 } else { 0 })),
            (Column::HPolAtteFirst, lane(&|ant| attn(t, ant)[0])),
            (Column::HPolAtteSecond, lane(&|ant| attn(t, ant)[1])),
            (Column::VPolAtteFirst, lane(&|ant| attn(t, ant)[2])),
            (Column::VPolAtteSecond, lane(&|ant| attn(t, ant)[3])),
            (Column::HPolLevel, lane(&|ant| level(t, ant)[0])),
            (Column::VPolLevel, lane(&|ant| level(t, ant)[1])),
        ];
        store.push_antenna_rows(T0.add_secs(t as i64), &columns);
    }
    store
}

/// As [`fem_store_with_liveness`], with every record live.
pub fn fem_store(
    num_times: usize,
    attn: impl Fn(usize, usize) -> [i64; 4],
    level: impl Fn(usize, usize) -> [i64; 2],
) -> MemoryTelemetry {
    fem_store_with_liveness(num_times, attn, level, |_, _| true)
}

/// A store holding `num_secs` seconds of identical attenuator settings on
/// every antenna from `start`, with every level at 0.
pub fn constant_gain_store(start: Instant, num_secs: usize, attn: [i64; 4]) -> MemoryTelemetry {
    let mut store = MemoryTelemetry::new(SchemaVersion::new("66").unwrap());
    for t in 0..num_secs {
        let columns = [
            (Column::FemClockMs, [1; NUM_ANTS]),
            (Column::HPolAtteFirst, [attn[0]; NUM_ANTS]),
            (Column::HPolAtteSecond, [attn[1]; NUM_ANTS]),
            (Column::VPolAtteFirst, [attn[2]; NUM_ANTS]),
            (Column::VPolAtteSecond, [attn[3]; NUM_ANTS]),
            (Column::HPolLevel, [0; NUM_ANTS]),
            (Column::VPolLevel, [0; NUM_ANTS]),
        ];
        store.push_antenna_rows(start.add_secs(t as i64), &columns);
    }
    store
}

/// Switch DPP offset attenuation on for `num_times` seconds from [`T0`], with
/// `offset(t, slot)` the offset on each DCM slot.
pub fn push_dcm_offsets(
    store: &mut MemoryTelemetry,
    num_times: usize,
    offset: impl Fn(usize, usize) -> f64,
) {
    for t in 0..num_times {
        let at = T0.add_secs(t as i64);
        store.push_row(Table::System, at, [(Column::DppOffsetAttnOn, Value::Int(1))]);
        for slot in 0..NUM_DCM_SLOTS {
            store.push_row(
                Table::Slot,
                at,
                [(Column::DcmOffsetAttn, Value::Float(offset(t, slot)))],
            );
        }
    }
}

/// A calibration header with `num_bands` bands of zero DCM attenuation and no
/// reference calibration.
pub fn header(num_bands: usize) -> MemoryCalHeader {
    MemoryCalHeader {
        dcm_attn: Some(Array2::zeros((num_bands, NUM_ANTS * NUM_POLS))),
        refcal_time: None,
    }
}

/// The collaborators behind a test context.
pub struct Fixture {
    pub telemetry: MemoryTelemetry,
    pub header: MemoryCalHeader,
    pub scans: MemoryScanLocator,
    pub attn_store: MemoryAttnStore,
}

impl Fixture {
    pub fn new(telemetry: MemoryTelemetry, header: MemoryCalHeader) -> Self {
        Self {
            telemetry,
            header,
            scans: MemoryScanLocator::default(),
            attn_store: MemoryAttnStore::default(),
        }
    }
}

pub fn test_context(fixture: &Fixture) -> GainCalContext<'_> {
    GainCalContextBuilder::default()
        .telemetry(&fixture.telemetry)
        .cal_header(&fixture.header)
        .scan_locator(&fixture.scans)
        .attn_store(&fixture.attn_store)
        .build()
        .unwrap()
}

/// A GAINCALTEST measurement of `num_ants` antennas at `fghz`, where every
/// entry is distinct and level `l` attenuates by about `2 l` dB.
pub fn measurement(time: Instant, fghz: &[f64], num_ants: usize) -> AttenuationMeasurement {
    AttenuationMeasurement {
        time,
        fghz: fghz.to_vec(),
        attn: Array4::from_shape_fn(
            (NUM_MEASURED_LEVELS, num_ants, NUM_POLS, fghz.len()),
            |(level, ant, pol, freq)| {
                2.0 * (level + 1) as f64 + 0.01 * ant as f64 + 0.1 * pol as f64 + 0.001 * freq as f64
            },
        ),
    }
}

/// A record of ones with `num_times` integrations one second apart from
/// [`T0`].
pub fn correlator_data(num_times: usize, fghz: &[f64]) -> CorrelatorData {
    let time = (0..num_times as i64).map(|t| T0.add_secs(t).to_jd()).collect();
    CorrelatorData::ones(time, fghz.to_vec())
}
