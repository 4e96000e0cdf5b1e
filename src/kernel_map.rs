use std::f64::consts::PI;

/// Samples of the rectangular window spectrum are taken over
/// `[-2 / (period * WINDOW_EPSILON), 2 / (period * WINDOW_EPSILON)]`.
const WINDOW_EPSILON: f64 = 1e-2;
const WINDOW_SAMPLES: f64 = 2. * 1024. + 1.;

/// Explicit feature map for the chi-squared kernel `k(x, y) = 2xy / (x + y)`.
///
/// Each input dimension expands into `2 * order + 1` outputs so that the dot
/// product of two mapped vectors approximates the sum of per-dimension kernel
/// values. The kernel signature is sampled at multiples of `L = 2π / period`
/// after smoothing with a rectangular window of width `period`, and negative
/// spectrum values are clipped to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneousKernelMap {
    order: usize,
    sampling_step: f64,
    /// Smoothed spectrum at `j * sampling_step` for `j` in `0..=order`.
    kappa: Vec<f64>,
}

/// Spectrum of the chi-squared kernel signature.
fn chi2_spectrum(omega: f64) -> f64 {
    2. / ((PI * omega).exp() + (-PI * omega).exp())
}

fn sinc(x: f64) -> f64 {
    if x == 0. {
        1.
    } else {
        x.sin() / x
    }
}

impl HomogeneousKernelMap {
    /// Chi-squared map of order 1.
    pub fn chi2() -> Self {
        Self::with_order(1)
    }

    pub fn with_order(order: usize) -> Self {
        let period = 5.86 * (order as f64).sqrt() + 3.65;
        let sampling_step = 2. * PI / period;
        let omega_range = 2. / (period * WINDOW_EPSILON);
        let d_omega = 2. * omega_range / WINDOW_SAMPLES;

        let smooth = |omega: f64| {
            let mut kappa_hat = 0.;
            let mut omega_p = -omega_range;
            while omega_p <= omega_range {
                let window = sinc(period / 2. * omega_p) * period / (2. * PI);
                kappa_hat += window * chi2_spectrum(omega_p + omega);
                omega_p += d_omega;
            }
            (kappa_hat * d_omega).max(0.)
        };
        let kappa = (0..=order).map(|j| smooth(j as f64 * sampling_step)).collect();

        Self {
            order,
            sampling_step,
            kappa,
        }
    }

    /// Number of outputs per input dimension.
    pub fn expansion(&self) -> usize {
        2 * self.order + 1
    }

    /// Map one vector; zero components map to zero blocks.
    pub fn evaluate(&self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len() * self.expansion());
        for &x in input {
            let x = x as f64;
            if x == 0. {
                out.extend(std::iter::repeat(0.).take(self.expansion()));
                continue;
            }
            let (sign, magnitude) = (x.signum(), x.abs());
            let log_x = magnitude.ln();
            out.push((sign * (magnitude * self.sampling_step * self.kappa[0]).sqrt()) as f32);
            for j in 1..=self.order {
                let scale = sign * (2. * magnitude * self.sampling_step * self.kappa[j]).sqrt();
                let phase = j as f64 * self.sampling_step * log_x;
                out.push((scale * phase.cos()) as f32);
                out.push((scale * phase.sin()) as f32);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn output_layout() {
        let map = HomogeneousKernelMap::chi2();
        assert_eq!(map.expansion(), 3);
        let out = map.evaluate(&[0.5, 0., 0.25]);
        assert_eq!(out.len(), 9);
        assert_eq!(&out[3..6], &[0., 0., 0.]);
    }

    #[test]
    fn approximates_chi2_kernel() {
        let map = HomogeneousKernelMap::chi2();
        for &(x, y) in &[(0.3f32, 0.5f32), (0.2, 0.2), (0.7, 0.4)] {
            let exact = 2. * x * y / (x + y);
            let approx = dot(&map.evaluate(&[x]), &map.evaluate(&[y]));
            assert!(
                (approx - exact).abs() < 0.1 * exact,
                "k({}, {}) = {} but map gives {}",
                x,
                y,
                exact,
                approx
            );
        }
    }

    #[test]
    fn spectrum_is_non_negative() {
        let map = HomogeneousKernelMap::with_order(3);
        assert!(map.kappa.iter().all(|&k| k >= 0.));
    }
}
