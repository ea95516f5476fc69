//! small numeric helpers shared by the mixer, meters and plugins

/// linear gain to decibels, floored at -100 dB
pub fn to_db(lin: f64) -> f64 {
    if lin <= 0.00001 {
        return -100.0;
    }
    20.0 * f64::log10(lin)
}

/// keep a control value in the -1.0 to 1.0 range, mapping NaN to 0.0
pub fn clip_float(v: f32) -> f32 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(-1.0, 1.0)
}

/// one-pole smoothing coefficient for a time constant (seconds) at a given update rate
pub fn get_coef(time_constant: f64, rate: f64) -> f64 {
    if time_constant <= 0.0 || rate <= 0.0 {
        return 0.0;
    }
    f64::exp(-1.0 / (time_constant * rate))
}
