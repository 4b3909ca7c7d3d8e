pub mod fill;
pub mod symmetry;
