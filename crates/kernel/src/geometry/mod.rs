pub mod point;
pub mod vector;
pub mod rotation;
pub mod transform;
pub mod intersection;
