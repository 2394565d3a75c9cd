use nalgebra::{UnitQuaternion, Vector3};

/// One abscissa of a vector-valued Hermite interpolation problem.
pub(crate) struct VectorSample {
    pub t: f64,
    pub value: Vector3<f64>,
    pub first: Option<Vector3<f64>>,
    pub second: Option<Vector3<f64>>,
}

/// Hermite interpolation by divided differences with repeated nodes.
///
/// Returns the interpolated value and its first time derivative. Samples
/// without derivatives degrade to plain Lagrange interpolation; abscissas
/// must be distinct across samples.
pub(crate) fn hermite(samples: &[VectorSample], t: f64) -> (Vector3<f64>, Vector3<f64>) {
    let mut z: Vec<f64> = Vec::new();
    let mut owner: Vec<usize> = Vec::new();
    let mut column: Vec<Vector3<f64>> = Vec::new();
    for (k, s) in samples.iter().enumerate() {
        let repeats = 1 + usize::from(s.first.is_some()) + usize::from(s.second.is_some());
        for _ in 0..repeats {
            z.push(s.t);
            owner.push(k);
            column.push(s.value);
        }
    }

    let n = z.len();
    let mut coeffs: Vec<Vector3<f64>> = Vec::with_capacity(n);
    coeffs.push(column[0]);
    for order in 1..n {
        let mut next = Vec::with_capacity(n - order);
        for i in 0..n - order {
            let denom = z[i + order] - z[i];
            let v = if denom == 0.0 {
                // confluent block of a repeated node: derivative / order!
                let s = &samples[owner[i]];
                match order {
                    1 => s.first.expect("repeated node without first derivative"),
                    2 => s.second.expect("repeated node without second derivative") / 2.0,
                    _ => unreachable!("at most two derivative orders per sample"),
                }
            } else {
                (column[i + 1] - column[i]) / denom
            };
            next.push(v);
        }
        coeffs.push(next[0]);
        column = next;
    }

    // Horner evaluation of the Newton form, carrying the derivative
    let mut value = coeffs[n - 1];
    let mut derivative = Vector3::zeros();
    for k in (0..n - 1).rev() {
        let dt = t - z[k];
        derivative = value + derivative * dt;
        value = coeffs[k] + value * dt;
    }
    (value, derivative)
}

/// One abscissa of an attitude interpolation problem; the rate, when
/// present, is the angular velocity in the rotated frame.
pub(crate) struct RotationSample {
    pub t: f64,
    pub rotation: UnitQuaternion<f64>,
    pub rate: Option<Vector3<f64>>,
    pub rate_derivative: Option<Vector3<f64>>,
}

fn shortest(q: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    if q.w < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

/// Interpolates attitude rotations over a small time window.
///
/// Rotations are mapped to rotation vectors relative to the middle sample,
/// interpolated as vectors, then mapped back. Rates are used as rotation
/// vector derivatives, which is accurate as long as the window spans small
/// relative rotations; the resampling step is responsible for keeping it so.
pub(crate) fn interpolate_rotation(samples: &[RotationSample], t: f64) -> (UnitQuaternion<f64>, Vector3<f64>) {
    let reference = samples[samples.len() / 2].rotation;
    let inv_reference = reference.inverse();

    let vector_samples: Vec<VectorSample> = samples
        .iter()
        .map(|s| VectorSample {
            t: s.t,
            value: shortest(s.rotation * inv_reference).scaled_axis(),
            first: s.rate,
            second: s.rate_derivative,
        })
        .collect();

    let (r, r_dot) = hermite(&vector_samples, t);
    (UnitQuaternion::from_scaled_axis(r) * reference, r_dot)
}
