//! Coordinate rotations.
//!
//! [`matrix`] holds the pure rotation algebra; [`frame`] applies it to a
//! [`Dataset`](crate::dataset::Dataset) and keeps its frame metadata
//! consistent.

pub mod frame;
pub mod matrix;

pub use frame::{FrameManager, rotate2};
pub use matrix::{
    Mat3, calc_principal_heading, is_positive_definite, rotate_tensor, rotation_z,
    tau_from_vectors, vectors_from_tau,
};
