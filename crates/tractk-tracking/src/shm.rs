//! Real symmetric spherical harmonics.
//!
//! Only even degrees are kept, so every basis function is antipodally
//! symmetric. Coefficient `j` holds degree `l` and order `m` with
//! `j = l (l + 1) / 2 + m`. For `m < 0` the basis is `sqrt(2) K P_l^|m| cos(|m| phi)`,
//! for `m > 0` it is `sqrt(2) K P_l^m sin(m phi)`, and `m = 0` is the zonal term.

use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Number of coefficients up to even degree `order`.
pub fn n_coeffs(order: usize) -> usize {
    (order + 1) * (order + 2) / 2
}

/// Degree `l` of every coefficient, in coefficient order.
pub fn degrees(order: usize) -> Vec<usize> {
    (0..=order)
        .step_by(2)
        .flat_map(|l| std::iter::repeat(l).take(2 * l + 1))
        .collect()
}

/// Associated Legendre function `P_l^m(x)`, without the Condon-Shortley phase.
pub fn associated_legendre(l: usize, m: usize, x: f64) -> f64 {
    debug_assert!(m <= l);
    let mut pmm = 1.0;
    if m > 0 {
        let somx2 = ((1.0 - x) * (1.0 + x)).max(0.0).sqrt();
        let mut fact = 1.0;
        for _ in 0..m {
            pmm *= fact * somx2;
            fact += 2.0;
        }
    }
    if l == m {
        return pmm;
    }
    let mut pmmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pmmp1;
    }
    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = (x * (2 * ll - 1) as f64 * pmmp1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pmmp1;
        pmmp1 = pll;
    }
    pll
}

/// Legendre polynomial at zero, `P_l(0)`, for even `l`.
pub fn legendre_at_zero(l: usize) -> f64 {
    // (-1)^(l/2) (l-1)!! / l!!
    let mut value = 1.0;
    let mut k = 2;
    while k <= l {
        value *= -((k - 1) as f64) / k as f64;
        k += 2;
    }
    value
}

fn normalisation(l: usize, m: usize) -> f64 {
    // sqrt((2l+1)/(4 pi) (l-m)!/(l+m)!)
    let ratio: f64 = ((l - m + 1)..=(l + m)).map(|k| 1.0 / k as f64).product();
    ((2 * l + 1) as f64 / (4.0 * PI) * ratio).sqrt()
}

/// Polar angle and azimuth of a unit vector.
pub fn to_spherical(v: &[f64; 3]) -> (f64, f64) {
    let theta = v[2].clamp(-1.0, 1.0).acos();
    let phi = v[1].atan2(v[0]);
    (theta, phi)
}

/// Basis values for one direction.
pub fn basis(order: usize, direction: &[f64; 3]) -> Vec<f64> {
    let (theta, phi) = to_spherical(direction);
    let x = theta.cos();
    let mut out = Vec::with_capacity(n_coeffs(order));
    for l in (0..=order).step_by(2) {
        for m in -(l as i64)..=(l as i64) {
            let am = m.unsigned_abs() as usize;
            let value = normalisation(l, am) * associated_legendre(l, am, x);
            out.push(match m.signum() {
                -1 => std::f64::consts::SQRT_2 * value * (am as f64 * phi).cos(),
                0 => value,
                _ => std::f64::consts::SQRT_2 * value * (am as f64 * phi).sin(),
            });
        }
    }
    out
}

/// Basis matrix: one row per direction.
pub fn basis_matrix(order: usize, directions: &[[f64; 3]]) -> DMatrix<f64> {
    let n = n_coeffs(order);
    let mut matrix = DMatrix::zeros(directions.len(), n);
    for (r, d) in directions.iter().enumerate() {
        for (c, value) in basis(order, d).into_iter().enumerate() {
            matrix[(r, c)] = value;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sphere::Sphere;

    #[test]
    fn test_coefficient_layout() {
        assert_eq!(n_coeffs(6), 28);
        assert_eq!(degrees(4), vec![0, 2, 2, 2, 2, 2, 4, 4, 4, 4, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn test_legendre_values() {
        assert_eq!(legendre_at_zero(0), 1.0);
        assert!((legendre_at_zero(2) + 0.5).abs() < 1e-12);
        assert!((legendre_at_zero(4) - 0.375).abs() < 1e-12);
        // P_2(x) = (3x^2 - 1) / 2
        assert!((associated_legendre(2, 0, 0.3) - (3.0 * 0.09 - 1.0) / 2.0).abs() < 1e-12);
        // P_2^2(x) = 3 (1 - x^2)
        assert!((associated_legendre(2, 2, 0.3) - 3.0 * 0.91).abs() < 1e-12);
    }

    #[test]
    fn test_basis_is_orthonormal_on_dense_sphere() {
        let sphere = Sphere::fibonacci(4000);
        let b = basis_matrix(4, sphere.vertices());
        let gram = b.transpose() * &b * (4.0 * PI / sphere.len() as f64);
        let identity = DMatrix::<f64>::identity(gram.nrows(), gram.ncols());
        assert!((gram - identity).abs().max() < 1e-2);
    }

    #[test]
    fn test_basis_is_antipodally_symmetric() {
        let v = [0.48, -0.6, 0.64];
        let a = basis(6, &v);
        let b = basis(6, &[-v[0], -v[1], -v[2]]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-10);
        }
    }
}
