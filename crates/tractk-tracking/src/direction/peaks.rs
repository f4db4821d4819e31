//! ODF peak extraction.

use crate::sphere::{dot, Sphere};

/// Local maxima of an ODF sampled on a sphere.
#[derive(Debug, Clone)]
pub struct PeakFinder<'a> {
    sphere: &'a Sphere,
    relative_threshold: f64,
    min_separation_cos: f64,
    max_peaks: usize,
}

impl<'a> PeakFinder<'a> {
    pub fn new(sphere: &'a Sphere, relative_threshold: f64, min_separation_deg: f64, max_peaks: usize) -> Self {
        Self {
            sphere,
            relative_threshold,
            min_separation_cos: min_separation_deg.to_radians().cos(),
            max_peaks,
        }
    }

    pub fn sphere(&self) -> &'a Sphere {
        self.sphere
    }

    /// Peak directions, strongest first.
    ///
    /// Antipodal vertices describe the same axis, so separation is measured
    /// on `|cos|` and only one of each pair survives.
    pub fn find(&self, odf: &[f64]) -> Vec<[f64; 3]> {
        let mut maxima: Vec<(usize, f64)> = (0..self.sphere.len())
            .filter(|&i| odf[i] > 0.0 && self.sphere.neighbours(i).iter().all(|&j| odf[i] >= odf[j]))
            .map(|i| (i, odf[i]))
            .collect();
        maxima.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let Some(&(_, strongest)) = maxima.first() else {
            return Vec::new();
        };

        let mut peaks: Vec<[f64; 3]> = Vec::with_capacity(self.max_peaks);
        for (i, value) in maxima {
            if peaks.len() == self.max_peaks || value < self.relative_threshold * strongest {
                break;
            }
            let v = self.sphere.vertex(i);
            if peaks.iter().all(|p| dot(p, &v).abs() < self.min_separation_cos) {
                peaks.push(v);
            }
        }
        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sum of sharp lobes around `axes` (antipodally symmetric).
    fn lobes(sphere: &Sphere, axes: &[([f64; 3], f64)]) -> Vec<f64> {
        sphere
            .vertices()
            .iter()
            .map(|v| axes.iter().map(|(a, w)| w * dot(v, a).powi(20)).sum())
            .collect()
    }

    #[test]
    fn test_merges_antipodes_and_orders_by_strength() {
        let sphere = Sphere::fibonacci(724);
        let odf = lobes(&sphere, &[([1.0, 0.0, 0.0], 0.8), ([0.0, 0.0, 1.0], 1.0)]);
        let peaks = PeakFinder::new(&sphere, 0.5, 25.0, 5).find(&odf);
        assert_eq!(peaks.len(), 2);
        assert!(peaks[0][2].abs() > 0.99);
        assert!(peaks[1][0].abs() > 0.99);
    }

    #[test]
    fn test_threshold_and_cap() {
        let sphere = Sphere::fibonacci(724);
        let odf = lobes(
            &sphere,
            &[([1.0, 0.0, 0.0], 1.0), ([0.0, 1.0, 0.0], 0.9), ([0.0, 0.0, 1.0], 0.3)],
        );
        assert_eq!(PeakFinder::new(&sphere, 0.5, 25.0, 5).find(&odf).len(), 2);
        assert_eq!(PeakFinder::new(&sphere, 0.2, 25.0, 5).find(&odf).len(), 3);
        assert_eq!(PeakFinder::new(&sphere, 0.2, 25.0, 1).find(&odf).len(), 1);
        assert!(PeakFinder::new(&sphere, 0.5, 25.0, 2).find(&vec![0.0; sphere.len()]).is_empty());
    }
}
