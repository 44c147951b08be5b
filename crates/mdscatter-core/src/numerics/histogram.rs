use std::f64::consts::PI;

/// Uniform bins over `[minimum, maximum)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialBins {
    minimum: f64,
    step: f64,
    count: usize,
}

impl RadialBins {
    pub fn new(minimum: f64, maximum: f64, step: f64) -> Option<Self> {
        if step <= 0.0 || maximum <= minimum {
            return None;
        }
        let count = ((maximum - minimum) / step + 1.0e-9).floor() as usize;
        if count == 0 {
            return None;
        }
        Some(Self {
            minimum,
            step,
            count,
        })
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.minimum + self.step * self.count as f64
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bin(&self, value: f64) -> Option<usize> {
        if value < self.minimum {
            return None;
        }
        let index = ((value - self.minimum) / self.step).floor() as usize;
        (index < self.count).then_some(index)
    }

    pub fn edges(&self) -> Vec<f64> {
        (0..=self.count)
            .map(|i| self.minimum + i as f64 * self.step)
            .collect()
    }

    pub fn midpoints(&self) -> Vec<f64> {
        (0..self.count)
            .map(|i| self.minimum + (i as f64 + 0.5) * self.step)
            .collect()
    }

    /// Exact spherical shell volumes `(4π/3)(r_{i+1}³ − r_i³)`.
    pub fn shell_volumes(&self) -> Vec<f64> {
        self.edges()
            .windows(2)
            .map(|pair| 4.0 * PI / 3.0 * (pair[1].powi(3) - pair[0].powi(3)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: RadialBins,
    counts: Vec<f64>,
}

impl Histogram {
    pub fn new(bins: RadialBins) -> Self {
        let counts = vec![0.0; bins.len()];
        Self { bins, counts }
    }

    pub fn bins(&self) -> &RadialBins {
        &self.bins
    }

    /// Adds `weight` to the bin of `value`; out-of-range values are dropped.
    pub fn add(&mut self, value: f64, weight: f64) -> bool {
        match self.bins.bin(value) {
            Some(index) => {
                self.counts[index] += weight;
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{Histogram, RadialBins};
    use std::f64::consts::PI;

    #[test]
    fn bins_expose_midpoints_and_exact_shell_volumes() {
        let bins = RadialBins::new(0.0, 1.0, 0.25).expect("bins");
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.midpoints(), vec![0.125, 0.375, 0.625, 0.875]);
        let total: f64 = bins.shell_volumes().iter().sum();
        assert!((total - 4.0 * PI / 3.0).abs() < 1e-12);
        assert!(RadialBins::new(1.0, 0.0, 0.1).is_none());
    }

    #[test]
    fn histogram_drops_values_outside_the_range() {
        let mut histogram = Histogram::new(RadialBins::new(0.0, 1.0, 0.5).expect("bins"));
        assert!(histogram.add(0.2, 1.0));
        assert!(histogram.add(0.7, 2.0));
        assert!(!histogram.add(1.0, 1.0));
        assert!(!histogram.add(-0.1, 1.0));
        assert_eq!(histogram.counts(), &[1.0, 2.0]);
        assert_eq!(histogram.total(), 3.0);
    }
}
