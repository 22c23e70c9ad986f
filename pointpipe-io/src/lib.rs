#![warn(clippy::all)]

//! Readers and filter stages for schema-driven point cloud pipelines
//!
//! A pipeline is an acyclic graph of [stages](crate::base::Stage): readers at the leaves,
//! filters above them. Callers pull points by requesting an iterator from a stage and
//! repeatedly filling a [PointBuffer](pointpipe_core::containers::PointBuffer) from it,
//! either in sequential or in random access mode. See the [base](crate::base) module for
//! the traversal contracts, the [las](crate::las) module for the LAS file driver and the
//! [filters](crate::filters) module for the available filter stages.

/// The stage and iterator contracts every pipeline node implements
pub mod base;
/// Filter stages that transform or merge point streams
pub mod filters;
/// Support for reading LAS point cloud files
pub mod las;
