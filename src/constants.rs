//! # Constants and type definitions for Ichnos
//!
//! This module centralizes the **numerical tolerances**, **unit aliases** and **default
//! values** shared by the trackway analysis modules.
//!
//! ## Overview
//!
//! - Floating-point tolerances used by the geometry and statistics kernels
//! - Angle unit aliases (degrees ↔ radians)
//! - Default sizes for simulation ensembles and clustering searches

use nalgebra::Point2;

// -------------------------------------------------------------------------------------------------
// Numerical tolerances
// -------------------------------------------------------------------------------------------------

/// Numerical epsilon used for floating-point comparisons
pub const EPS: f64 = 1e-9;

/// Mean cosine above which a path is considered to never turn (sinuosity limit)
pub const STRAIGHT_COS_EPS: f64 = 1e-12;

/// Absolute per-axis tolerance when de-duplicating intersection points
pub const INTERSECTION_EPS: f64 = 1e-9;

/// Relative threshold under which a variance component is treated as zero (singular fit)
pub const SINGULAR_TOL: f64 = 1e-8;

/// Offset used by the shifted-log transform of non-positive variables
pub const SHIFT_EPS: f64 = 1e-6;

// -------------------------------------------------------------------------------------------------
// Defaults
// -------------------------------------------------------------------------------------------------

/// Default number of simulated replicates
pub const DEFAULT_NSIM: usize = 1000;

/// Upper bound for the number of mixture components searched by default
pub const DEFAULT_MAX_CLUSTERS: usize = 9;

/// Trackways with fewer footprints are excluded from clustering
pub const MIN_FOOTPRINTS_CLUSTER: usize = 4;

/// Maximum rejection-sampling attempts when drawing a point inside a region
pub const MAX_REJECTION_ATTEMPTS: usize = 100_000;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// A 2D position in digitization units
pub type Point = Point2<f64>;
