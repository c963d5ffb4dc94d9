//! Rigid-body math for assembly solving.
//!
//! Vectors, points, rotations in every representation the solver needs
//! (quaternion, axis-angle, Euler ZYX, azimuth/elevation) and the few
//! geometric primitives used by constraint bookkeeping.

pub mod geometry;

pub use geometry::intersection::{
    distance_between_axes, plane_degrees_of_freedom, plane_intersection, AxisLine,
};
pub use geometry::point::Point3d;
pub use geometry::rotation::{
    axis_to_azimuth_elevation, azimuth_elevation_to_axis,
    rotation_required_to_rotate_a_vector_to_be_aligned_to_another_vector, AxisAngle, EulerZyx,
    Quaternion,
};
pub use geometry::transform::Placement;
pub use geometry::vector::Vec3;

