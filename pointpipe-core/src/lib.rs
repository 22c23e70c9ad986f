#![warn(clippy::all)]

//! Core data structures for schema-driven point cloud pipelines
//!
//! pointpipe models point cloud data as capacity-bounded buffers whose per-point fields
//! are described by a [Schema](crate::layout::Schema). Readers and filters (see the
//! `pointpipe-io` crate) fill and transform these buffers. The best entry points for
//! understanding this crate are the [layout](crate::layout) and
//! [containers](crate::containers) modules.

pub extern crate nalgebra;

/// Buffers that hold point data
pub mod containers;
/// The shared error taxonomy of the pipeline
pub mod error;
/// Defines the dimensions and layout of point records
pub mod layout;
/// Math types for working with point cloud data
pub mod math;
