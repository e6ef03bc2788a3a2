//! Reference-counted tensor handle with gradient tracking

use super::BackwardOp;
use crate::error::{Error, Result};
use ndarray::{Array1, ArrayD, IxDyn};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether operations currently record a computation graph
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Guard that disables graph recording until dropped
pub struct NoGradGuard {
    previous: bool,
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|flag| flag.set(self.previous));
    }
}

/// Disable graph recording for the lifetime of the returned guard
///
/// ```
/// use invertir::autograd::{mul, no_grad, Tensor};
///
/// let a = Tensor::from_vec(vec![1.0, 2.0], true);
/// let _guard = no_grad();
/// assert!(!mul(&a, &a).requires_grad());
/// ```
#[must_use = "graph recording is re-enabled as soon as the guard is dropped"]
pub fn no_grad() -> NoGradGuard {
    let previous = GRAD_ENABLED.with(|flag| flag.replace(false));
    NoGradGuard { previous }
}

struct Node {
    id: usize,
    data: RefCell<ArrayD<f32>>,
    grad: RefCell<Option<ArrayD<f32>>>,
    requires_grad: Cell<bool>,
    backward_op: Option<Rc<dyn BackwardOp>>,
}

/// Tensor with automatic differentiation support
///
/// Cloning a `Tensor` clones the handle, not the storage: every clone sees
/// in-place updates made through [`Tensor::data_mut`]. Use
/// [`Tensor::deep_copy`] for independent storage.
#[derive(Clone)]
pub struct Tensor {
    node: Rc<Node>,
}

impl Tensor {
    fn build(
        data: ArrayD<f32>,
        requires_grad: bool,
        backward_op: Option<Rc<dyn BackwardOp>>,
    ) -> Self {
        Self {
            node: Rc::new(Node {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                data: RefCell::new(data),
                grad: RefCell::new(None),
                requires_grad: Cell::new(requires_grad),
                backward_op,
            }),
        }
    }

    /// Create a leaf tensor
    pub fn new(data: ArrayD<f32>, requires_grad: bool) -> Self {
        Self::build(data, requires_grad, None)
    }

    /// Create a 1-D leaf tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data).into_dyn(), requires_grad)
    }

    /// Create a leaf tensor with an explicit shape
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let array = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| Error::InvalidShape(format!("{shape:?}: {e}")))?;
        Ok(Self::new(array, requires_grad))
    }

    /// Create a 0-D constant
    pub fn scalar(value: f32) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(&[]), value), false)
    }

    /// Create a zero-filled leaf tensor
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        Self::new(ArrayD::zeros(IxDyn(shape)), requires_grad)
    }

    /// Create a constant that never requires grad
    pub fn constant(data: ArrayD<f32>) -> Self {
        Self::new(data, false)
    }

    /// Create the result of a differentiable operation
    ///
    /// The backward op is only attached when graph recording is enabled and
    /// at least one input requires grad.
    pub(crate) fn from_op(
        data: ArrayD<f32>,
        requires_grad: bool,
        op: impl FnOnce() -> Rc<dyn BackwardOp>,
    ) -> Self {
        if requires_grad && is_grad_enabled() {
            Self::build(data, true, Some(op()))
        } else {
            Self::build(data, false, None)
        }
    }

    /// Unique node id, monotonically increasing in creation order
    pub fn id(&self) -> usize {
        self.node.id
    }

    /// Borrow the underlying data
    pub fn data(&self) -> Ref<'_, ArrayD<f32>> {
        self.node.data.borrow()
    }

    /// Mutably borrow the underlying data
    ///
    /// Only leaves should be mutated; interior nodes keep the values they
    /// were computed with.
    pub fn data_mut(&self) -> RefMut<'_, ArrayD<f32>> {
        self.node.data.borrow_mut()
    }

    /// Copy of the underlying data
    pub fn to_array(&self) -> ArrayD<f32> {
        self.node.data.borrow().clone()
    }

    /// Shape of the tensor
    pub fn shape(&self) -> Vec<usize> {
        self.node.data.borrow().shape().to_vec()
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.node.data.borrow().ndim()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.node.data.borrow().len()
    }

    /// Check if tensor is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First element, the value of a scalar tensor
    pub fn item(&self) -> f32 {
        self.node.data.borrow().iter().next().copied().unwrap_or(f32::NAN)
    }

    /// Check if gradients are tracked for this tensor
    pub fn requires_grad(&self) -> bool {
        self.node.requires_grad.get()
    }

    /// Enable or disable gradient tracking on a leaf
    pub fn set_requires_grad(&self, requires_grad: bool) -> Result<()> {
        if !self.is_leaf() {
            return Err(Error::NoGradient(format!(
                "cannot change gradient tracking of non-leaf tensor {}",
                self.id()
            )));
        }
        self.node.requires_grad.set(requires_grad);
        Ok(())
    }

    /// Check if this tensor was created by the user rather than an op
    pub fn is_leaf(&self) -> bool {
        self.node.backward_op.is_none()
    }

    /// Backward op that produced this tensor
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.node.backward_op.clone()
    }

    /// Accumulated gradient, if any
    pub fn grad(&self) -> Option<ArrayD<f32>> {
        self.node.grad.borrow().clone()
    }

    /// Overwrite the accumulated gradient
    pub fn set_grad(&self, grad: ArrayD<f32>) {
        *self.node.grad.borrow_mut() = Some(grad);
    }

    /// Add to the accumulated gradient
    pub fn accumulate_grad(&self, grad: ArrayD<f32>) {
        let mut slot = self.node.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
    }

    /// Apply a function to every element of the accumulated gradient
    pub fn map_grad_inplace(&self, f: impl FnMut(&mut f32)) {
        if let Some(grad) = self.node.grad.borrow_mut().as_mut() {
            grad.map_inplace(f);
        }
    }

    /// Release the accumulated gradient
    pub fn zero_grad(&self) {
        *self.node.grad.borrow_mut() = None;
    }

    /// New leaf sharing no storage and no graph with this tensor
    pub fn detach(&self) -> Tensor {
        Tensor::new(self.to_array(), false)
    }

    /// New leaf with copied storage and the same gradient tracking flag
    pub fn deep_copy(&self) -> Tensor {
        Tensor::new(self.to_array(), self.requires_grad())
    }

    /// Check whether two handles point to the same storage
    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .field("op", &self.node.backward_op.as_ref().map(|op| op.name()))
            .finish()
    }
}
