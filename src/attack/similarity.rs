//! Gradient-similarity metrics
//!
//! Both metrics take the candidate gradient first (the one carrying a graph
//! back to the reconstruction) and the observed client gradient second.

use crate::autograd::{add, add_scalar, div, mul, scale, sqrt, square, sub, sum};
use crate::error::{Error, Result};
use crate::Tensor;

/// Norms below this are treated as zero by [`cosine_similarity_weights`]
pub const NORM_EPSILON: f32 = 1e-10;

/// Number of parameters kept when restricting to the largest reference norms
pub const TOP_K_LAYERS: usize = 10;

fn check_pairing(candidate: &[Tensor], reference: &[Tensor]) -> Result<()> {
    if candidate.len() != reference.len() {
        return Err(Error::GradientLengthMismatch {
            candidate: candidate.len(),
            reference: reference.len(),
        });
    }
    for (index, (c, r)) in candidate.iter().zip(reference).enumerate() {
        if c.shape() != r.shape() {
            return Err(Error::ShapeMismatch {
                index,
                expected: r.shape(),
                actual: c.shape(),
            });
        }
    }
    Ok(())
}

fn sum_all(terms: impl Iterator<Item = Tensor>) -> Option<Tensor> {
    terms.reduce(|acc, t| add(&acc, &t))
}

fn l2_norm(t: &Tensor) -> f32 {
    t.data().iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Indices of the `k` parameters with the largest reference-gradient norm
fn top_k_by_norm(reference: &[Tensor], k: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = reference.iter().map(l2_norm).enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut indices: Vec<usize> = ranked.into_iter().take(k).map(|(i, _)| i).collect();
    indices.sort_unstable();
    indices
}

/// `1 - cos(candidate, reference)` over the flattened gradients
///
/// With `top10norms` only the [`TOP_K_LAYERS`] parameters with the largest
/// reference-gradient norm take part. When either norm is below
/// [`NORM_EPSILON`] the distance is the constant 1.
///
/// # Example
///
/// ```
/// use invertir::attack::cosine_similarity_weights;
/// use invertir::Tensor;
///
/// let g = vec![Tensor::from_vec(vec![1.0, 2.0], false)];
/// let d = cosine_similarity_weights(&g, &g, false).unwrap();
/// assert!(d.item().abs() < 1e-6);
/// ```
pub fn cosine_similarity_weights(
    candidate: &[Tensor],
    reference: &[Tensor],
    top10norms: bool,
) -> Result<Tensor> {
    check_pairing(candidate, reference)?;
    let indices: Vec<usize> = if top10norms {
        top_k_by_norm(reference, TOP_K_LAYERS)
    } else {
        (0..reference.len()).collect()
    };

    let reference_norm = indices
        .iter()
        .map(|&i| l2_norm(&reference[i]).powi(2))
        .sum::<f32>()
        .sqrt();
    let candidate_norm = indices
        .iter()
        .map(|&i| l2_norm(&candidate[i]).powi(2))
        .sum::<f32>()
        .sqrt();
    if reference_norm < NORM_EPSILON || candidate_norm < NORM_EPSILON {
        return Ok(Tensor::scalar(1.0));
    }

    let dot = sum_all(indices.iter().map(|&i| sum(&mul(&candidate[i], &reference[i]))));
    let squared = sum_all(indices.iter().map(|&i| sum(&square(&candidate[i]))));
    let (Some(dot), Some(squared)) = (dot, squared) else {
        return Ok(Tensor::scalar(1.0));
    };

    let similarity = scale(&div(&dot, &sqrt(&squared)), 1.0 / reference_norm);
    Ok(add_scalar(&scale(&similarity, -1.0), 1.0))
}

/// Sum of squared elementwise differences across all parameters
pub fn l2_distance(candidate: &[Tensor], reference: &[Tensor]) -> Result<Tensor> {
    check_pairing(candidate, reference)?;
    Ok(
        sum_all(candidate.iter().zip(reference).map(|(c, r)| sum(&square(&sub(c, r)))))
            .unwrap_or_else(|| Tensor::scalar(0.0)),
    )
}
