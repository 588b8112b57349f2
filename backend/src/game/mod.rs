pub mod constants;
pub mod dispatch;
pub mod geometry;
pub mod input;
pub mod land;
pub mod territory;
pub mod types;
pub mod world;
