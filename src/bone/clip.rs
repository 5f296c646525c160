use log::{debug, warn};
use serde::Serialize;

use super::hierarchy::{BoneHierarchy, BoneNameTable};
use crate::chunk::{ChunkGraph, ControllerChunk, TimingChunk};
use crate::error::{ImportError, Result};
use crate::math::{axis_correction, Mat4, Quat, Vec3};

// ============================================================================
// Animation clips
// ============================================================================

/// One controller sample, positions already scaled
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Keyframe {
    /// Engine ticks
    pub time: i32,
    /// `time / ticks_per_frame`, truncated
    pub frame: i32,
    pub position: Vec3,
    pub rotation: Quat,
    /// `translate(position) * inverse(rotation)`
    pub local_matrix: Mat4,
}

impl Keyframe {
    fn new(time: i32, ticks_per_frame: i32, position: Vec3, rotation: Quat) -> Self {
        Self {
            time,
            frame: time / ticks_per_frame,
            position,
            rotation,
            local_matrix: local_matrix(position, rotation),
        }
    }
}

fn local_matrix(position: Vec3, rotation: Quat) -> Mat4 {
    Mat4::from_translation(position) * Mat4::from_quat(rotation).inverse()
}

/// Keys for one bone, ordered by time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationTrack {
    /// Index into the hierarchy the clip was resolved against
    pub bone: usize,
    pub bone_name: String,
    pub name_hash: u32,
    pub keyframes: Vec<Keyframe>,
}

impl AnimationTrack {
    /// Position and rotation at `tick`, clamped to the first and last key
    pub fn sample(&self, tick: f32) -> Option<(Vec3, Quat)> {
        let first = self.keyframes.first()?;
        let next_idx = self.keyframes.partition_point(|kf| kf.time as f32 <= tick);

        if next_idx == 0 {
            return Some((first.position, first.rotation));
        }
        let prev = &self.keyframes[next_idx - 1];
        if next_idx >= self.keyframes.len() {
            return Some((prev.position, prev.rotation));
        }

        let next = &self.keyframes[next_idx];
        // Key times span the full i32 range
        let segment = f64::from(next.time) - f64::from(prev.time);
        let t = if segment > 0.0 {
            ((f64::from(tick) - f64::from(prev.time)) / segment) as f32
        } else {
            0.0
        };
        Some((
            prev.position.lerp(next.position, t),
            prev.rotation.slerp(next.rotation, t),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationClip {
    /// Short name: the source file name without extension
    pub name: String,
    pub secs_per_tick: f32,
    pub ticks_per_frame: i32,
    pub start_frame: i32,
    pub end_frame: i32,
    /// Playback rate, rounded up to whole frames per second
    pub fps: u32,
    pub tracks: Vec<AnimationTrack>,
}

impl AnimationClip {
    pub fn track(&self, bone_name: &str) -> Option<&AnimationTrack> {
        self.tracks.iter().find(|t| t.bone_name == bone_name)
    }

    pub fn frame_count(&self) -> u32 {
        let span = (i64::from(self.end_frame) - i64::from(self.start_frame)).max(0);
        u32::try_from(span + 1).unwrap_or(u32::MAX)
    }

    /// Local matrix per animated bone at `frame`
    pub fn sample(&self, frame: f32) -> Vec<(usize, Mat4)> {
        let tick = frame * self.ticks_per_frame as f32;
        self.tracks
            .iter()
            .filter_map(|track| {
                let (position, rotation) = track.sample(tick)?;
                Some((track.bone, local_matrix(position, rotation)))
            })
            .collect()
    }

    /// Object-space matrix per bone at `frame`. Bones without a track keep
    /// their bind matrix.
    pub fn pose_at(&self, hierarchy: &BoneHierarchy, frame: f32) -> Vec<Mat4> {
        let correction = axis_correction();
        let inverse_correction = correction.transpose();

        let mut local: Vec<Option<Mat4>> = vec![None; hierarchy.len()];
        for (bone, matrix) in self.sample(frame) {
            if let Some(slot) = local.get_mut(bone) {
                *slot = Some(matrix);
            }
        }

        let mut pose: Vec<Mat4> = hierarchy.bones().iter().map(|b| b.bind_matrix).collect();
        for index in hierarchy.topological_order() {
            let Some(l) = local[index] else {
                continue;
            };
            pose[index] = match hierarchy.bones()[index].parent {
                Some(parent) => pose[parent] * inverse_correction * l * correction,
                None => l * correction,
            };
        }
        pose
    }
}

/// Frames per second for a tick length, rounded up
pub fn frame_rate(timing: &TimingChunk) -> u32 {
    let seconds_per_frame = timing.secs_per_tick as f64 * timing.ticks_per_frame as f64;
    if seconds_per_frame > 0.0 {
        (1.0 / seconds_per_frame).ceil() as u32
    } else {
        0
    }
}

fn resolve_track(
    controller: &ControllerChunk,
    names: &BoneNameTable,
    hierarchy: &BoneHierarchy,
    ticks_per_frame: i32,
    scale: f32,
) -> Option<AnimationTrack> {
    let Some(name) = names.resolve(controller.ctrl_id) else {
        warn!(
            "Controller {:#010x} matches no known bone, skipping",
            controller.ctrl_id
        );
        return None;
    };
    let Some(bone) = hierarchy.index_of(name) else {
        warn!("Bone '{}' is not in the skeleton, skipping its controller", name);
        return None;
    };

    let mut keyframes: Vec<Keyframe> = controller
        .keys
        .iter()
        .map(|k| Keyframe::new(k.time, ticks_per_frame, k.position * scale, k.rotation))
        .collect();
    keyframes.sort_by_key(|k| k.time);

    Some(AnimationTrack {
        bone,
        bone_name: name.to_string(),
        name_hash: controller.ctrl_id,
        keyframes,
    })
}

/// Build a clip from an animation graph. Controllers whose hash or bone is
/// unknown are skipped; a missing timing chunk is a format error.
pub fn resolve_clip(
    name: &str,
    graph: &ChunkGraph,
    names: &BoneNameTable,
    hierarchy: &BoneHierarchy,
    scale: f32,
) -> Result<AnimationClip> {
    let timing = graph
        .timing()
        .ok_or_else(|| ImportError::format(format!("animation '{}' has no timing chunk", name)))?;
    if timing.ticks_per_frame <= 0 {
        return Err(ImportError::format(format!(
            "animation '{}' has {} ticks per frame",
            name, timing.ticks_per_frame
        )));
    }

    let tracks: Vec<AnimationTrack> = graph
        .controllers()
        .filter_map(|c| resolve_track(c, names, hierarchy, timing.ticks_per_frame, scale))
        .collect();

    let clip = AnimationClip {
        name: name.to_string(),
        secs_per_tick: timing.secs_per_tick,
        ticks_per_frame: timing.ticks_per_frame,
        start_frame: timing.global_range.start,
        end_frame: timing.global_range.end,
        fps: frame_rate(timing),
        tracks,
    };
    debug!(
        "Clip '{}': {} tracks, frames {}..={} at {} fps",
        clip.name,
        clip.tracks.len(),
        clip.start_frame,
        clip.end_frame,
        clip.fps
    );
    Ok(clip)
}
