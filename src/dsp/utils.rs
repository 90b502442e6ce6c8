//! Small numeric helpers shared by the DSP stages.

/// Floor used before taking logarithms of linear levels.
pub const DB_EPS: f32 = 1e-9;

/// Magnitudes below this are flushed to zero in filter state.
pub const DENORMAL_FLOOR: f32 = 1e-20;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole step fraction for a time constant given in seconds.
///
/// Used as `state += step * (target - state)`. A time of zero yields 1.0.
#[inline]
pub fn step_coeff(time_s: f32, sample_rate: f32) -> f32 {
    if time_s <= 0.0 {
        return 1.0;
    }
    1.0 - (-1.0 / (time_s * sample_rate)).exp()
}

#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < DENORMAL_FLOOR {
        0.0
    } else {
        x
    }
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}
