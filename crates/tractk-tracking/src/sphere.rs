//! Discrete unit spheres for sampling orientation distributions.

use crate::error::{Result, TrackingError};

/// Unit vertices with precomputed neighbourhoods.
///
/// Vertices cover the whole sphere, so an antipodally symmetric ODF shows
/// each peak twice; peak extraction merges the pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    name: String,
    vertices: Vec<[f64; 3]>,
    neighbours: Vec<Vec<usize>>,
}

impl Sphere {
    /// `n` nearly uniform points on a golden-angle spiral.
    pub fn fibonacci(n: usize) -> Self {
        let golden = std::f64::consts::PI * (3.0 - 5f64.sqrt());
        let vertices: Vec<[f64; 3]> = (0..n)
            .map(|i| {
                let z = 1.0 - (2.0 * i as f64 + 1.0) / n as f64;
                let r = (1.0 - z * z).max(0.0).sqrt();
                let phi = golden * i as f64;
                [r * phi.cos(), r * phi.sin(), z]
            })
            .collect();

        // neighbours: vertices within ~1.6 mean spacings
        let spacing = (4.0 * std::f64::consts::PI / n as f64).sqrt();
        let cos_limit = (1.6 * spacing).min(std::f64::consts::PI).cos();
        let neighbours = (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i && dot(&vertices[i], &vertices[j]) >= cos_limit)
                    .collect()
            })
            .collect();

        Self { name: format!("fibonacci{n}"), vertices, neighbours }
    }

    /// Resolve a sphere by name: `repulsion100`, `repulsion200`,
    /// `repulsion724`, or `fibonacci<N>` for `N >= 12`.
    pub fn named(name: &str) -> Result<Self> {
        let n = match name {
            "repulsion100" => Some(100),
            "repulsion200" => Some(200),
            "repulsion724" => Some(724),
            other => other.strip_prefix("fibonacci").and_then(|n| n.parse::<usize>().ok()).filter(|n| *n >= 12),
        };
        let n = n.ok_or_else(|| {
            TrackingError::invalid_configuration(format!(
                "unknown sphere '{name}' (expected repulsion100, repulsion200, repulsion724 or fibonacci<N>)"
            ))
        })?;
        let mut sphere = Self::fibonacci(n);
        sphere.name = name.to_string();
        Ok(sphere)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn vertex(&self, i: usize) -> [f64; 3] {
        self.vertices[i]
    }

    pub fn neighbours(&self, i: usize) -> &[usize] {
        &self.neighbours[i]
    }

    /// Index of the vertex closest to `direction`.
    pub fn closest(&self, direction: &[f64; 3]) -> usize {
        let mut best = 0;
        let mut best_dot = f64::NEG_INFINITY;
        for (i, v) in self.vertices.iter().enumerate() {
            let d = dot(v, direction);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }
}

#[inline]
pub(crate) fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn normalize(v: [f64; 3]) -> Option<[f64; 3]> {
    let n = dot(&v, &v).sqrt();
    (n > 1e-12 && n.is_finite()).then(|| [v[0] / n, v[1] / n, v[2] / n])
}
