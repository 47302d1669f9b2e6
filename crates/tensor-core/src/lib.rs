// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Lightweight tensor types and reference kernels for model conversion.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, row-major `f32` tensor.
//! - [`Shape`]: runtime shape descriptors with NCHW helpers.
//! - [`DType`]: element data types a model may declare (f32, f16, bf16, i8, u8).
//! - Reference kernels: conv2d, linear, batch norm, pooling, activations
//!   and softmax.
//!
//! The kernels are what the tracer runs while it records a model's forward
//! pass, and what the reference interpreter uses to check that compiler
//! passes preserve numerics. They favour clarity over speed.

mod dtype;
mod error;
mod ops;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{
    activation, batch_norm, conv2d, flatten, global_avg_pool, linear, max_pool2d, softmax,
    Activation, Conv2dParams, Pool2dParams,
};
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
