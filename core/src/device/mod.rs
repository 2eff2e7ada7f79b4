pub mod fifo;
pub mod mpeg;
pub mod real3d;
pub mod tilegen;
