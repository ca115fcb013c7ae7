pub mod channel;
pub mod class;
pub mod lidar;
pub mod tiling;
