//! Phase and grid helpers, and physical constants.

use std::f64::consts::PI;

/// Planck constant in J·s (exact, SI 2019).
pub const PLANCK: f64 = 6.626_070_15e-34;

/// Convert a power in dBm to watts.
pub fn dbm_to_watts(power_dbm: f64) -> f64 {
    1e-3 * 10f64.powf(power_dbm / 10.0)
}

/// Photon rate (photons per second) carried by `power_dbm` at `frequency` Hz.
pub fn photon_rate(power_dbm: f64, frequency: f64) -> f64 {
    dbm_to_watts(power_dbm) / (PLANCK * frequency)
}

/// Remove 2π jumps between consecutive phases.
pub fn unwrap_phase(phase: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(phase.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phase {
        if let Some(q) = prev {
            let step = p - q;
            if step > PI {
                offset -= 2.0 * PI * ((step + PI) / (2.0 * PI)).floor();
            } else if step < -PI {
                offset += 2.0 * PI * ((-step + PI) / (2.0 * PI)).floor();
            }
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|k| start + step * k as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unwrap_restores_linear_ramp() {
        let truth: Vec<f64> = (0..50).map(|i| -0.4 * i as f64).collect();
        let wrapped: Vec<f64> = truth
            .iter()
            .map(|p| (p + PI).rem_euclid(2.0 * PI) - PI)
            .collect();
        let unwrapped = unwrap_phase(&wrapped);
        for (u, t) in unwrapped.iter().zip(&truth) {
            assert_relative_eq!(u, t, epsilon = 1e-12);
        }
    }

    #[test]
    fn linspace_includes_endpoints() {
        assert_eq!(linspace(1.0, 2.0, 5), vec![1.0, 1.25, 1.5, 1.75, 2.0]);
        assert_eq!(linspace(3.0, 4.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn photon_rate_at_zero_dbm() {
        // 1 mW at 1 GHz.
        let rate = photon_rate(0.0, 1e9);
        assert_relative_eq!(rate, 1e-3 / (PLANCK * 1e9), max_relative = 1e-12);
        assert_relative_eq!(dbm_to_watts(-30.0), 1e-6, max_relative = 1e-12);
    }
}
