//! Streamlines and the bundles collected over a sweep.

use tractk_core::spatial::Spacing;

/// Ordered points in continuous voxel indices `(x, y, z)` of the diffusion
/// grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Streamline {
    points: Vec<[f64; 3]>,
}

impl Streamline {
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Polyline length in mm.
    pub fn length_mm(&self, spacing: &Spacing<3>) -> f64 {
        self.points
            .windows(2)
            .map(|w| {
                (0..3)
                    .map(|a| ((w[1][a] - w[0][a]) * spacing[a]).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .sum()
    }
}

impl AsRef<[[f64; 3]]> for Streamline {
    fn as_ref(&self) -> &[[f64; 3]] {
        &self.points
    }
}

/// Provenance of one (curvature, step) pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSummary {
    pub curvature: f64,
    pub step: f64,
    pub seeds: usize,
    /// Streamlines produced before filtering.
    pub generated: usize,
    /// Streamlines that survived filtering and were appended.
    pub kept: usize,
}

/// Streamlines concatenated in pass order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamlineBundle {
    streamlines: Vec<Streamline>,
    passes: Vec<PassSummary>,
}

impl StreamlineBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streamlines(&self) -> &[Streamline] {
        &self.streamlines
    }

    pub fn passes(&self) -> &[PassSummary] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.streamlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streamlines.is_empty()
    }

    /// Append one pass's survivors.
    pub fn extend_pass(&mut self, summary: PassSummary, streamlines: Vec<Streamline>) {
        debug_assert_eq!(summary.kept, streamlines.len());
        self.streamlines.extend(streamlines);
        self.passes.push(summary);
    }

    /// Range of streamline indices contributed by pass `i`.
    pub fn pass_range(&self, i: usize) -> std::ops::Range<usize> {
        let start: usize = self.passes[..i].iter().map(|p| p.kept).sum();
        start..start + self.passes[i].kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_uses_spacing() {
        let s = Streamline::new(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 2.0]]);
        assert!((s.length_mm(&Spacing::uniform(1.0)) - 3.0).abs() < 1e-12);
        assert!((s.length_mm(&Spacing::new([2.0, 2.0, 0.5])) - 3.0).abs() < 1e-12);
        assert_eq!(Streamline::new(vec![[1.0; 3]]).length_mm(&Spacing::uniform(1.0)), 0.0);
    }

    #[test]
    fn test_pass_ranges() {
        let mut bundle = StreamlineBundle::new();
        let line = Streamline::new(vec![[0.0; 3], [1.0; 3]]);
        let summary = |kept| PassSummary { curvature: 30.0, step: 0.5, seeds: 4, generated: 4, kept };
        bundle.extend_pass(summary(2), vec![line.clone(), line.clone()]);
        bundle.extend_pass(summary(0), vec![]);
        bundle.extend_pass(summary(1), vec![line]);
        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.pass_range(0), 0..2);
        assert_eq!(bundle.pass_range(1), 2..2);
        assert_eq!(bundle.pass_range(2), 2..3);
    }
}
