//! Tests for autograd operations with gradient checking

mod higher_order;
