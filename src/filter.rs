use crate::types::Point3D;
use std::f32::consts::TAU;

/// Elapsed time is clamped to this floor so a paused or duplicated frame
/// cannot blow up the derivative estimate.
const MIN_DT: f32 = 1.0e-3;

fn smoothing_factor(dt: f32, cutoff: f32) -> f32 {
    let r = TAU * cutoff * dt;
    r / (r + 1.0)
}

/// One-euro filter vectorized over every coordinate of a landmark set.
///
/// The cutoff frequency adapts to the filtered derivative estimate:
/// slow signals get heavy smoothing, fast motion raises the cutoff so the
/// output lags less. The first sample passes through unchanged.
pub struct LandmarkFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x: Vec<f32>,
    dx: Vec<f32>,
    prev_raw: Vec<f32>,
    initialized: bool,
}

impl LandmarkFilter {
    pub fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x: Vec::new(),
            dx: Vec::new(),
            prev_raw: Vec::new(),
            initialized: false,
        }
    }

    pub fn reset(&mut self) {
        self.x.clear();
        self.dx.clear();
        self.prev_raw.clear();
        self.initialized = false;
    }

    /// Filters `points` in place. A sample whose length differs from the
    /// stored state resets the filter (the landmark model changed).
    pub fn apply(&mut self, points: &mut [Point3D], dt: f32) {
        let n = points.len() * 3;
        if !self.initialized || self.x.len() != n {
            self.x.clear();
            self.dx.clear();
            self.prev_raw.clear();
            for p in points.iter() {
                self.x.extend_from_slice(&[p.x, p.y, p.z]);
            }
            self.dx.resize(n, 0.0);
            self.prev_raw = self.x.clone();
            self.initialized = true;
            return;
        }

        let dt = dt.max(MIN_DT);
        let alpha_d = smoothing_factor(dt, self.d_cutoff);
        for (i, p) in points.iter_mut().enumerate() {
            for (c, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                let k = i * 3 + c;
                let raw_dx = (v - self.prev_raw[k]) / dt;
                self.dx[k] = alpha_d * raw_dx + (1.0 - alpha_d) * self.dx[k];
                let cutoff = self.min_cutoff + self.beta * self.dx[k].abs();
                let alpha = smoothing_factor(dt, cutoff);
                self.x[k] = alpha * v + (1.0 - alpha) * self.x[k];
                self.prev_raw[k] = v;
            }
            p.x = self.x[i * 3];
            p.y = self.x[i * 3 + 1];
            p.z = self.x[i * 3 + 2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(v: f32) -> Vec<Point3D> {
        vec![Point3D::new(v, 0.0, 0.0)]
    }

    #[test]
    fn first_sample_passes_through() {
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        let mut pts = single(123.456);
        f.apply(&mut pts, 1.0 / 60.0);
        assert_eq!(pts[0].x, 123.456, "first sample must be returned unchanged");
    }

    #[test]
    fn constant_signal_stays_constant() {
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        for _ in 0..100 {
            let mut pts = single(42.0);
            f.apply(&mut pts, 1.0 / 60.0);
            assert!(
                (pts[0].x - 42.0).abs() < 1e-5,
                "constant input drifted to {}",
                pts[0].x
            );
        }
    }

    #[test]
    fn converges_to_constant_after_step() {
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        let mut pts = single(0.0);
        f.apply(&mut pts, 1.0 / 60.0);
        let mut last = 0.0;
        for _ in 0..600 {
            let mut pts = single(10.0);
            f.apply(&mut pts, 1.0 / 60.0);
            last = pts[0].x;
        }
        assert!((last - 10.0).abs() < 1e-3, "filter stuck at {}", last);
    }

    #[test]
    fn attenuates_single_pixel_jitter() {
        // +-1px oscillation at 60 fps must lose more than half its
        // peak-to-peak amplitude with the default tuning.
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for i in 0..240 {
            let raw = 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 };
            let mut pts = single(raw);
            f.apply(&mut pts, 1.0 / 60.0);
            if i >= 200 {
                min = min.min(pts[0].x);
                max = max.max(pts[0].x);
            }
        }
        let peak_to_peak = max - min;
        assert!(
            peak_to_peak < 1.0,
            "jitter only reduced to {} peak-to-peak (raw 2.0)",
            peak_to_peak
        );
    }

    #[test]
    fn zero_dt_does_not_produce_nan() {
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        let mut pts = single(1.0);
        f.apply(&mut pts, 0.0);
        let mut pts = single(2.0);
        f.apply(&mut pts, 0.0);
        assert!(pts[0].x.is_finite(), "zero dt produced {}", pts[0].x);
    }

    #[test]
    fn length_change_resets_state() {
        let mut f = LandmarkFilter::new(1.5, 0.3, 1.0);
        let mut pts = single(5.0);
        f.apply(&mut pts, 1.0 / 60.0);
        let mut pts = vec![Point3D::new(9.0, 0.0, 0.0); 2];
        f.apply(&mut pts, 1.0 / 60.0);
        assert_eq!(pts[0].x, 9.0, "resized sample must pass through unfiltered");
    }
}
