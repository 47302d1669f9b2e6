// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference tensor kernels.
//!
//! Shape-preserving operations (activations, batch norm, softmax) write
//! into a pre-allocated output buffer. Operations whose
//! output shape depends on their parameters (convolution, pooling,
//! linear, flatten) compute the shape themselves and return a new tensor.
//!
//! All kernels expect NCHW activations.

mod activation_op;
mod conv_op;
mod linear_op;
mod norm_op;
mod pool_op;
mod softmax_op;

pub use activation_op::{activation, Activation};
pub use conv_op::{conv2d, Conv2dParams};
pub use linear_op::linear;
pub use norm_op::batch_norm;
pub use pool_op::{flatten, global_avg_pool, max_pool2d, Pool2dParams};
pub use softmax_op::softmax;
