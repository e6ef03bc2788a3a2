//! Priors on the reconstruction: total variation, range penalty, median pooling

use crate::autograd::{abs, add, narrow, neg, relu, square, sub, sum};
use crate::error::{Error, Result};
use crate::Tensor;
use ndarray::{ArrayD, IxDyn};

/// Sum of absolute differences between neighbours over the last two axes
///
/// Leading axes (batch, channels) are treated independently.
///
/// # Example
///
/// ```
/// use invertir::attack::total_variation;
/// use invertir::Tensor;
///
/// let flat = Tensor::from_shape_vec(&[2, 2], vec![0.5; 4], false).unwrap();
/// assert_eq!(total_variation(&flat).unwrap().item(), 0.0);
/// ```
pub fn total_variation(x: &Tensor) -> Result<Tensor> {
    let ndim = x.ndim();
    if ndim < 2 {
        return Err(Error::InvalidShape(format!(
            "total variation needs at least 2 axes, got shape {:?}",
            x.shape()
        )));
    }
    let shape = x.shape();
    let (rows, cols) = (ndim - 2, ndim - 1);

    let diff = |axis: usize| {
        let n = shape[axis].saturating_sub(1);
        sum(&abs(&sub(&narrow(x, axis, 1, n), &narrow(x, axis, 0, n))))
    };
    Ok(add(&diff(cols), &diff(rows)))
}

/// `sum(relu(-x)^2)`, zero for non-negative inputs
pub fn negative_range_penalty(x: &Tensor) -> Tensor {
    sum(&square(&relu(&neg(x))))
}

/// Reflect an out-of-range index back into `0..n`
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    r.clamp(0, n - 1) as usize
}

/// 3×3 median filter with stride 1 and reflect padding of 1
///
/// Works on the last two axes; every leading index is filtered separately.
pub fn median_pool2d(x: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    let shape = x.shape().to_vec();
    let ndim = shape.len();
    if ndim < 2 {
        return Err(Error::InvalidShape(format!(
            "median pooling needs at least 2 axes, got shape {shape:?}"
        )));
    }
    let (h, w) = (shape[ndim - 2], shape[ndim - 1]);
    let plane = h * w;
    let values: Vec<f32> = x.iter().copied().collect();
    let mut out = Vec::with_capacity(values.len());
    let mut window = [0.0f32; 9];

    for image in values.chunks(plane.max(1)) {
        for row in 0..h {
            for col in 0..w {
                let mut k = 0;
                for dr in -1..=1 {
                    for dc in -1..=1 {
                        let r = reflect(row as isize + dr, h);
                        let c = reflect(col as isize + dc, w);
                        window[k] = image[r * w + c];
                        k += 1;
                    }
                }
                window.sort_unstable_by(f32::total_cmp);
                out.push(window[4]);
            }
        }
    }

    ArrayD::from_shape_vec(IxDyn(&shape), out).map_err(|e| Error::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_tv_known_value() {
        // [[0, 1], [3, 3]]: horizontal |1-0| + |3-3| = 1, vertical |3-0| + |3-1| = 5
        let x = Tensor::from_shape_vec(&[2, 2], vec![0.0, 1.0, 3.0, 3.0], false).unwrap();
        assert_abs_diff_eq!(total_variation(&x).unwrap().item(), 6.0);
    }

    #[test]
    fn test_tv_batches_independent() {
        let x = Tensor::from_shape_vec(&[2, 1, 1, 2], vec![0.0, 1.0, 5.0, 5.0], false).unwrap();
        assert_abs_diff_eq!(total_variation(&x).unwrap().item(), 1.0);
    }

    #[test]
    fn test_tv_rejects_vectors() {
        assert!(total_variation(&Tensor::from_vec(vec![1.0, 2.0], false)).is_err());
    }

    #[test]
    fn test_tv_single_pixel_is_zero() {
        let x = Tensor::zeros(&[1, 1, 1, 1], true);
        assert_eq!(total_variation(&x).unwrap().item(), 0.0);
    }

    #[test]
    fn test_tv_gradient() {
        let x = Tensor::from_shape_vec(&[1, 2], vec![0.0, 2.0], true).unwrap();
        backward(&total_variation(&x).unwrap()).unwrap();
        let g = x.grad().unwrap();
        assert_abs_diff_eq!(g[[0, 0]], -1.0);
        assert_abs_diff_eq!(g[[0, 1]], 1.0);
    }

    #[test]
    fn test_range_penalty() {
        let x = Tensor::from_vec(vec![-2.0, 0.5, -1.0], true);
        let p = negative_range_penalty(&x);
        assert_abs_diff_eq!(p.item(), 5.0);
        backward(&p).unwrap();
        let g = x.grad().unwrap();
        assert_abs_diff_eq!(g[[0]], -4.0);
        assert_abs_diff_eq!(g[[1]], 0.0);
        assert_abs_diff_eq!(g[[2]], -2.0);
    }

    #[test]
    fn test_median_pool_removes_outlier() {
        let mut data = vec![1.0; 9];
        data[4] = 100.0;
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 1, 3, 3]), data).unwrap();
        let pooled = median_pool2d(&x).unwrap();
        assert!(pooled.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_median_pool_reflect_border() {
        // row [0, 1, 2] reflected: left window {1, 0, 1}, right window {1, 2, 1}
        let x = ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![0.0, 1.0, 2.0]).unwrap();
        let pooled = median_pool2d(&x).unwrap();
        assert_eq!(pooled.as_slice().unwrap(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_median_pool_preserves_constant() {
        let x = ArrayD::from_elem(IxDyn(&[2, 3, 4, 5]), 0.25);
        assert_eq!(median_pool2d(&x).unwrap(), x);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_tv_zero_iff_constant(
            values in prop::collection::vec(-5.0f32..5.0, 9),
            c in -5.0f32..5.0,
        ) {
            let constant = Tensor::from_shape_vec(&[3, 3], vec![c; 9], false).unwrap();
            prop_assert_eq!(total_variation(&constant).unwrap().item(), 0.0);

            let is_constant = values.iter().all(|&v| v == values[0]);
            let x = Tensor::from_shape_vec(&[3, 3], values, false).unwrap();
            let tv = total_variation(&x).unwrap().item();
            prop_assert_eq!(tv > 0.0, !is_constant);
        }

        #[test]
        fn prop_median_pool_within_bounds(values in prop::collection::vec(-5.0f32..5.0, 16)) {
            let lo = values.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let x = ArrayD::from_shape_vec(IxDyn(&[4, 4]), values).unwrap();
            let pooled = median_pool2d(&x).unwrap();
            prop_assert!(pooled.iter().all(|&v| v >= lo && v <= hi));
        }
    }
}
