pub mod classifier;
pub mod landmark;
pub mod skeleton;

pub use classifier::{classify, PoseLabel};
pub use landmark::{JointIndex, Landmark, LandmarkSet};
pub use skeleton::{draw_overlay, SKELETON_CONNECTIONS};
