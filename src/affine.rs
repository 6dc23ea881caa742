//! 4x4 affine helpers
//!
//! Affines are stored row-major as `[f64; 16]` with the last row `0 0 0 1`,
//! mapping voxel indices `(i, j, k)` to scanner coordinates in mm.

/// Quaternion representation of an affine (NIfTI qform)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quatern {
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub offset: [f64; 3],
    /// Voxel sizes along each axis
    pub pixdim: [f64; 3],
    /// +1 or -1, handedness of the voxel axes
    pub qfac: f64,
}

pub const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Diagonal affine with the given voxel sizes and zero offset
pub fn from_voxel_size(voxel_size: (f64, f64, f64)) -> [f64; 16] {
    let (vx, vy, vz) = voxel_size;
    [
        vx, 0.0, 0.0, 0.0,
        0.0, vy, 0.0, 0.0,
        0.0, 0.0, vz, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Matrix product `a * b`
pub fn multiply(a: &[f64; 16], b: &[f64; 16]) -> [f64; 16] {
    let mut out = [0.0; 16];
    for r in 0..4 {
        for c in 0..4 {
            let mut s = 0.0;
            for k in 0..4 {
                s += a[r * 4 + k] * b[k * 4 + c];
            }
            out[r * 4 + c] = s;
        }
    }
    out
}

/// Inverse of an affine, `None` if the linear part is singular
pub fn invert(a: &[f64; 16]) -> Option<[f64; 16]> {
    let m = [
        [a[0], a[1], a[2]],
        [a[4], a[5], a[6]],
        [a[8], a[9], a[10]],
    ];
    let det = det3(&m);
    if det.abs() < 1e-12 || !det.is_finite() {
        return None;
    }

    // Inverse of the 3x3 block via the adjugate
    let inv = [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ];

    let t = [a[3], a[7], a[11]];
    let mut out = IDENTITY;
    for r in 0..3 {
        for c in 0..3 {
            out[r * 4 + c] = inv[r][c];
        }
        out[r * 4 + 3] = -(inv[r][0] * t[0] + inv[r][1] * t[1] + inv[r][2] * t[2]);
    }
    Some(out)
}

/// Apply an affine to a point
#[inline]
pub fn apply(a: &[f64; 16], p: [f64; 3]) -> [f64; 3] {
    [
        a[0] * p[0] + a[1] * p[1] + a[2] * p[2] + a[3],
        a[4] * p[0] + a[5] * p[1] + a[6] * p[2] + a[7],
        a[8] * p[0] + a[9] * p[1] + a[10] * p[2] + a[11],
    ]
}

/// Voxel sizes as the norms of the affine's columns
pub fn voxel_sizes(a: &[f64; 16]) -> (f64, f64, f64) {
    let col = |c: usize| (a[c] * a[c] + a[4 + c] * a[4 + c] + a[8 + c] * a[8 + c]).sqrt();
    (col(0), col(1), col(2))
}

/// Element-wise comparison with absolute tolerance
pub fn approx_eq(a: &[f64; 16], b: &[f64; 16], tol: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

/// Min/max of the grid corners `0..n-1` mapped through `a`, per output axis
pub fn grid_bounds(dims: (usize, usize, usize), a: &[f64; 16]) -> [(f64, f64); 3] {
    let (nx, ny, nz) = dims;
    let ext = [
        nx.saturating_sub(1) as f64,
        ny.saturating_sub(1) as f64,
        nz.saturating_sub(1) as f64,
    ];
    let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); 3];
    for corner in 0..8 {
        let p = [
            if corner & 1 != 0 { ext[0] } else { 0.0 },
            if corner & 2 != 0 { ext[1] } else { 0.0 },
            if corner & 4 != 0 { ext[2] } else { 0.0 },
        ];
        let q = apply(a, p);
        for axis in 0..3 {
            bounds[axis].0 = bounds[axis].0.min(q[axis]);
            bounds[axis].1 = bounds[axis].1.max(q[axis]);
        }
    }
    bounds
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Build an affine from a NIfTI quaternion
pub fn from_quatern(q: &Quatern) -> [f64; 16] {
    let (mut b, mut c, mut d) = (q.b, q.c, q.d);
    let mut a = 1.0 - (b * b + c * c + d * d);
    if a < 1e-7 {
        // Quaternion is not normalised; treat as a 180 degree rotation
        a = 1.0 / (b * b + c * c + d * d).sqrt();
        b *= a;
        c *= a;
        d *= a;
        a = 0.0;
    } else {
        a = a.sqrt();
    }

    let xd = if q.pixdim[0] > 0.0 { q.pixdim[0] } else { 1.0 };
    let yd = if q.pixdim[1] > 0.0 { q.pixdim[1] } else { 1.0 };
    let mut zd = if q.pixdim[2] > 0.0 { q.pixdim[2] } else { 1.0 };
    if q.qfac < 0.0 {
        zd = -zd;
    }

    [
        (a * a + b * b - c * c - d * d) * xd,
        2.0 * (b * c - a * d) * yd,
        2.0 * (b * d + a * c) * zd,
        q.offset[0],
        2.0 * (b * c + a * d) * xd,
        (a * a + c * c - b * b - d * d) * yd,
        2.0 * (c * d - a * b) * zd,
        q.offset[1],
        2.0 * (b * d - a * c) * xd,
        2.0 * (c * d + a * b) * yd,
        (a * a + d * d - c * c - b * b) * zd,
        q.offset[2],
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Encode the rotation part of an affine as a NIfTI quaternion
///
/// Assumes the columns are orthogonal (no shear), which holds for every
/// affine this crate produces.
pub fn to_quatern(a: &[f64; 16]) -> Quatern {
    let (dx, dy, dz) = voxel_sizes(a);
    let unit = |v: f64, n: f64, fallback: f64| if n > 0.0 { v / n } else { fallback };

    let r11 = unit(a[0], dx, 1.0);
    let r21 = unit(a[4], dx, 0.0);
    let r31 = unit(a[8], dx, 0.0);
    let r12 = unit(a[1], dy, 0.0);
    let r22 = unit(a[5], dy, 1.0);
    let r32 = unit(a[9], dy, 0.0);
    let mut r13 = unit(a[2], dz, 0.0);
    let mut r23 = unit(a[6], dz, 0.0);
    let mut r33 = unit(a[10], dz, 1.0);

    let det = det3(&[[r11, r12, r13], [r21, r22, r23], [r31, r32, r33]]);
    let qfac = if det > 0.0 {
        1.0
    } else {
        r13 = -r13;
        r23 = -r23;
        r33 = -r33;
        -1.0
    };

    let trace = r11 + r22 + r33 + 1.0;
    let qa;
    let (mut b, mut c, mut d);
    if trace > 0.5 {
        qa = 0.5 * trace.sqrt();
        b = 0.25 * (r32 - r23) / qa;
        c = 0.25 * (r13 - r31) / qa;
        d = 0.25 * (r21 - r12) / qa;
    } else {
        let xd = 1.0 + r11 - (r22 + r33);
        let yd = 1.0 + r22 - (r11 + r33);
        let zd = 1.0 + r33 - (r11 + r22);
        if xd > 1.0 {
            b = 0.5 * xd.sqrt();
            c = 0.25 * (r12 + r21) / b;
            d = 0.25 * (r13 + r31) / b;
            qa = 0.25 * (r32 - r23) / b;
        } else if yd > 1.0 {
            c = 0.5 * yd.sqrt();
            b = 0.25 * (r12 + r21) / c;
            d = 0.25 * (r23 + r32) / c;
            qa = 0.25 * (r13 - r31) / c;
        } else {
            d = 0.5 * zd.sqrt();
            b = 0.25 * (r13 + r31) / d;
            c = 0.25 * (r23 + r32) / d;
            qa = 0.25 * (r21 - r12) / d;
        }
        if qa < 0.0 {
            b = -b;
            c = -c;
            d = -d;
        }
    }
    Quatern {
        b,
        c,
        d,
        offset: [a[3], a[7], a[11]],
        pixdim: [dx, dy, dz],
        qfac,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotated_affine() -> [f64; 16] {
        // 30 degree rotation about z, anisotropic voxels, offset
        let (s, c) = (30f64.to_radians().sin(), 30f64.to_radians().cos());
        [
            c * 0.8, -s * 0.9, 0.0, -90.0,
            s * 0.8, c * 0.9, 0.0, -126.0,
            0.0, 0.0, 1.2, -72.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    #[test]
    fn test_invert_roundtrip() {
        let a = rotated_affine();
        let inv = invert(&a).unwrap();
        let prod = multiply(&a, &inv);
        assert!(approx_eq(&prod, &IDENTITY, 1e-12), "{:?}", prod);
    }

    #[test]
    fn test_invert_singular() {
        let mut a = IDENTITY;
        a[10] = 0.0;
        assert!(invert(&a).is_none());
    }

    #[test]
    fn test_voxel_sizes() {
        let (x, y, z) = voxel_sizes(&rotated_affine());
        assert!((x - 0.8).abs() < 1e-12);
        assert!((y - 0.9).abs() < 1e-12);
        assert!((z - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_grid_bounds_diagonal() {
        let a = from_voxel_size((2.0, 1.0, 0.5));
        let b = grid_bounds((10, 20, 5), &a);
        assert_eq!(b[0], (0.0, 18.0));
        assert_eq!(b[1], (0.0, 19.0));
        assert_eq!(b[2], (0.0, 2.0));
    }

    #[test]
    fn test_quatern_roundtrip_rotation() {
        let a = rotated_affine();
        let q = to_quatern(&a);
        assert_eq!(q.qfac, 1.0);
        let back = from_quatern(&q);
        assert!(approx_eq(&a, &back, 1e-9), "{:?} vs {:?}", a, back);
    }

    #[test]
    fn test_quatern_roundtrip_flipped_axis() {
        // Radiological orientation: x axis flipped
        let a = [
            -1.0, 0.0, 0.0, 90.0,
            0.0, 1.0, 0.0, -126.0,
            0.0, 0.0, 1.0, -72.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let q = to_quatern(&a);
        let back = from_quatern(&q);
        assert!(approx_eq(&a, &back, 1e-9), "{:?} vs {:?}", a, back);
    }

    #[test]
    fn test_quatern_identity() {
        let q = to_quatern(&from_voxel_size((1.6, 1.6, 5.0)));
        assert_eq!((q.b, q.c, q.d), (0.0, 0.0, 0.0));
        assert!((q.pixdim[2] - 5.0).abs() < 1e-12);
    }
}
