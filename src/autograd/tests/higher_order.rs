//! Gradient-of-gradient checks

use super::test_utils::{finite_difference, flat, shaped};
use crate::autograd::{backward, exp, grad, matmul, mul, sqrt, sum, transpose, Tensor};
use approx::assert_abs_diff_eq;

#[test]
fn test_second_order_polynomial() {
    let w = Tensor::from_vec(vec![1.0, 1.0, 1.0], true);
    let x = Tensor::from_vec(vec![1.0, -2.0, 0.5], true);

    // y = Σ w·x², ∂y/∂w = x², Σ(∂y/∂w)² = Σ x⁴
    let y = sum(&mul(&w, &mul(&x, &x)));
    let gw = grad(&y, &[w.clone()], true).unwrap().remove(0);
    assert!(gw.requires_grad());
    assert_eq!(flat(&gw.to_array()), vec![1.0, 4.0, 0.25]);

    backward(&sum(&mul(&gw, &gw))).unwrap();
    let gx = x.grad().unwrap();
    // ∂Σx⁴/∂x = 4x³
    assert_abs_diff_eq!(gx[[0]], 4.0, epsilon = 1e-5);
    assert_abs_diff_eq!(gx[[1]], -32.0, epsilon = 1e-4);
    assert_abs_diff_eq!(gx[[2]], 0.5, epsilon = 1e-5);
}

#[test]
fn test_second_order_sqrt() {
    let x = Tensor::from_vec(vec![4.0], true);
    let g = grad(&sum(&sqrt(&x)), &[x.clone()], true).unwrap().remove(0);
    assert_abs_diff_eq!(g.item(), 0.25, epsilon = 1e-6);

    backward(&sum(&g)).unwrap();
    // d²√x/dx² = -1 / (4 x^{3/2})
    assert_abs_diff_eq!(x.grad().unwrap()[[0]], -0.03125, epsilon = 1e-6);
}

#[test]
fn test_second_order_exp() {
    let x = Tensor::from_vec(vec![0.5], true);
    let g = grad(&sum(&exp(&x)), &[x.clone()], true).unwrap().remove(0);
    backward(&sum(&g)).unwrap();
    assert_abs_diff_eq!(x.grad().unwrap()[[0]], 0.5f32.exp(), epsilon = 1e-5);
}

#[test]
fn test_without_create_graph_gradient_is_constant() {
    let x = Tensor::from_vec(vec![2.0], true);
    let g = grad(&sum(&mul(&x, &x)), &[x.clone()], false).unwrap().remove(0);
    assert!(!g.requires_grad());
    assert!(backward(&sum(&g)).is_err());
}

/// Σ (∂L/∂W ⊙ R) where L = Σ (x Wᵀ)², differentiated with respect to x
fn weight_gradient_match(x_data: &[f32], create_graph: bool) -> (f32, Option<Vec<f32>>) {
    let w = shaped(&[2, 3], vec![0.5, -1.0, 0.25, 1.5, 0.75, -0.5], true);
    let r = shaped(&[2, 3], vec![1.0, 0.5, -1.0, 0.25, 2.0, -0.5], false);
    let x = shaped(&[1, 3], x_data.to_vec(), create_graph);

    let y = matmul(&x, &transpose(&w));
    let loss = sum(&mul(&y, &y));
    let gw = grad(&loss, &[w], create_graph).unwrap().remove(0);
    let outer = sum(&mul(&gw, &r));
    let value = outer.item();

    if create_graph {
        backward(&outer).unwrap();
        (value, x.grad().map(|g| flat(&g)))
    } else {
        (value, None)
    }
}

#[test]
fn test_gradient_through_weight_gradient_matches_finite_difference() {
    let x = [0.3f32, -0.7, 1.1];
    let (_, analytical) = weight_gradient_match(&x, true);
    let analytical = analytical.expect("input gradient should be populated");

    let numerical = finite_difference(|v| weight_gradient_match(v, false).0, &x, 1e-2);
    for i in 0..x.len() {
        assert_abs_diff_eq!(analytical[i], numerical[i], epsilon = 5e-2);
    }
}
