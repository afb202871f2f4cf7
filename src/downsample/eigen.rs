//! Closed-form eigenvalues of real symmetric 3x3 matrices
//!
//! Uses the trigonometric solution of the characteristic cubic (Smith, 1961). For a
//! symmetric matrix all three roots are real, so the cubic can be written in terms of
//! `cos(acos(r) / 3 + 2πk / 3)` without complex arithmetic.

use glam::Vec3;
use std::f64::consts::PI;

use crate::types::Point;

/// Upper triangle of a symmetric 3x3 matrix, in f64.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymmetricMatrix3 {
    pub xx: f64,
    pub xy: f64,
    pub xz: f64,
    pub yy: f64,
    pub yz: f64,
    pub zz: f64,
}

impl SymmetricMatrix3 {
    pub fn diagonal(xx: f64, yy: f64, zz: f64) -> Self {
        Self { xx, yy, zz, ..Self::default() }
    }

    /// Population covariance of point positions about `centroid`.
    pub fn covariance(points: &[Point], centroid: Vec3) -> Self {
        if points.is_empty() {
            return Self::default();
        }

        let c = [centroid.x as f64, centroid.y as f64, centroid.z as f64];
        let mut m = Self::default();
        for p in points {
            let dx = p.position.x as f64 - c[0];
            let dy = p.position.y as f64 - c[1];
            let dz = p.position.z as f64 - c[2];
            m.xx += dx * dx;
            m.xy += dx * dy;
            m.xz += dx * dz;
            m.yy += dy * dy;
            m.yz += dy * dz;
            m.zz += dz * dz;
        }

        let n = points.len() as f64;
        Self {
            xx: m.xx / n,
            xy: m.xy / n,
            xz: m.xz / n,
            yy: m.yy / n,
            yz: m.yz / n,
            zz: m.zz / n,
        }
    }

    pub fn trace(&self) -> f64 {
        self.xx + self.yy + self.zz
    }

    pub fn determinant(&self) -> f64 {
        self.xx * (self.yy * self.zz - self.yz * self.yz)
            - self.xy * (self.xy * self.zz - self.yz * self.xz)
            + self.xz * (self.xy * self.yz - self.yy * self.xz)
    }
}

/// Eigenvalues in ascending order.
pub fn symmetric_eigenvalues(m: &SymmetricMatrix3) -> [f64; 3] {
    let off_diagonal = m.xy * m.xy + m.xz * m.xz + m.yz * m.yz;

    if off_diagonal == 0.0 {
        let mut diagonal = [m.xx, m.yy, m.zz];
        diagonal.sort_by(f64::total_cmp);
        return diagonal;
    }

    let q = m.trace() / 3.0;
    let p2 = (m.xx - q).powi(2) + (m.yy - q).powi(2) + (m.zz - q).powi(2) + 2.0 * off_diagonal;
    let p = (p2 / 6.0).sqrt();

    // B = (A - qI) / p, det(B) / 2 lies in [-1, 1] up to rounding
    let b = SymmetricMatrix3 {
        xx: (m.xx - q) / p,
        xy: m.xy / p,
        xz: m.xz / p,
        yy: (m.yy - q) / p,
        yz: m.yz / p,
        zz: (m.zz - q) / p,
    };
    let r = (b.determinant() / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;

    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * PI / 3.0).cos();
    let middle = 3.0 * q - largest - smallest;

    [smallest, middle, largest]
}
