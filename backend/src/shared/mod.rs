pub mod ids;
pub mod names;
