pub mod logging;

pub mod camera;
pub mod config;
pub mod engine;
pub mod frame;
pub mod mask;
pub mod orchestrator;
pub mod pose;
pub mod render;
pub mod session;
pub mod transport;
pub mod worker;
