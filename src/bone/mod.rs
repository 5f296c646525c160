//! Skeletal reconstruction.
//!
//! Organized into:
//! - `hierarchy` - bone arena, parent links, name hashes
//! - `bind_pose` - bind matrices, head/tail placement, roll
//! - `clip` - controller tracks, sampling and posing

mod bind_pose;
mod clip;
mod hierarchy;

pub use bind_pose::*;
pub use clip::*;
pub use hierarchy::*;
