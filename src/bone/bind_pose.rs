//! Bind pose resolution: bind matrices, head/tail placement and roll.

use log::debug;
use serde::Serialize;

use super::hierarchy::BoneHierarchy;
use crate::chunk::{ChunkGraph, ChunkRef};
use crate::error::{ImportError, Result};
use crate::math::{axis_correction, engine_matrix, vec_roll_to_basis, Mat3, Mat3Roll, Mat4, Vec3};

// --- Constants ---

/// Leaf tails extend this far along the bone's local Y axis
pub const LEAF_TAIL_FRACTION: f32 = 0.2;

/// Added to a root's tail Z so the bone never collapses to zero length
pub const ROOT_TAIL_NUDGE: f32 = 0.001;

/// Minimum squared length of the normalized direction to a single child
pub const SINGLE_CHILD_THRESHOLD: f32 = 1.0e-4;

/// Tail offset in bone space when a single child sits on the head
pub const SINGLE_CHILD_FALLBACK: Vec3 = Vec3::new(0.0, 0.05, 0.0);

/// Squared head-to-parent-tail distance under which a bone is connected
pub const CONNECT_EPSILON: f32 = 1.192_092_9e-7;

/// Output of bind pose resolution. Per-bone results are written into the
/// hierarchy itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindPose {
    /// Mesh the skeleton deforms
    pub skin_mesh: ChunkRef,
    /// Object-space bind matrix per bone, corrected into the target frame
    pub bind_matrices: Vec<Mat4>,
}

fn tail_for(hierarchy: &BoneHierarchy, index: usize) -> Result<Vec3> {
    let bones = hierarchy.bones();
    let bone = &bones[index];
    let bind = bone.bind_matrix;

    match bone.children.as_slice() {
        [] => {
            let forward = bind.y_axis.truncate();
            if forward.length_squared() < 1.0e-12 {
                return Err(ImportError::validation(format!(
                    "leaf bone '{}' has a degenerate bind basis",
                    bone.name
                )));
            }
            Ok(bone.head + forward.normalize() * LEAF_TAIL_FRACTION)
        }
        [child] => {
            // Roots get no nudge here; the tail sits on the child's head
            let seed = bones[*child].head;
            let local = bind.inverse().transform_point3(seed).normalize_or_zero();
            if local.length_squared() > SINGLE_CHILD_THRESHOLD {
                Ok(seed)
            } else {
                Ok(bind.transform_point3(SINGLE_CHILD_FALLBACK))
            }
        }
        children => {
            let sum: Vec3 = children.iter().map(|&c| bones[c].head).sum();
            let mut tail = sum / children.len() as f32;
            if bone.is_root() {
                tail.z += ROOT_TAIL_NUDGE;
            }
            Ok(tail)
        }
    }
}

/// Roll from the bind basis, or from the head-to-tail direction when the
/// basis cannot be decomposed.
fn roll_for(bind: &Mat4, head: Vec3, tail: Vec3, name: &str) -> Result<f32> {
    match Mat3::from_mat4(*bind).to_vec_roll() {
        Ok((_, roll)) => Ok(roll),
        Err(_) => {
            debug!("Bone '{}' bind basis degenerate, rolling from its direction", name);
            let basis = vec_roll_to_basis(tail - head, 0.0).map_err(|_| {
                ImportError::validation(format!("bone '{}' has no usable direction", name))
            })?;
            let (_, roll) = basis.to_vec_roll()?;
            Ok(roll)
        }
    }
}

/// Fill in bind matrix, head, tail, roll and connection for every bone.
pub fn resolve_bind_pose(
    hierarchy: &mut BoneHierarchy,
    graph: &ChunkGraph,
    auto_connect: bool,
) -> Result<BindPose> {
    let initial = graph
        .bone_initial_pos()
        .ok_or_else(|| ImportError::validation("skeleton has no initial bone positions"))?;
    if initial.bones.len() != hierarchy.len() {
        return Err(ImportError::validation(format!(
            "{} initial positions for {} bones",
            initial.bones.len(),
            hierarchy.len()
        )));
    }

    let correction = axis_correction();
    for (bone, raw) in hierarchy.bones_mut().iter_mut().zip(&initial.bones) {
        let bind = engine_matrix(&raw.rotation, raw.position.to_array()) * correction;
        bone.bind_matrix = bind;
        bone.origin_matrix = bind;
        bone.head = bind.w_axis.truncate();
    }

    // Tails read every head, so compute them all before writing any
    let tails = (0..hierarchy.len())
        .map(|i| tail_for(hierarchy, i))
        .collect::<Result<Vec<_>>>()?;

    for (i, tail) in tails.iter().enumerate() {
        let bone = &hierarchy.bones()[i];
        let roll = roll_for(&bone.bind_matrix, bone.head, *tail, &bone.name)?;
        let connected = auto_connect
            && bone
                .parent
                .is_some_and(|p| (tails[p] - bone.head).length_squared() <= CONNECT_EPSILON);

        let bone = &mut hierarchy.bones_mut()[i];
        bone.tail = *tail;
        bone.roll = roll;
        bone.connected = connected;
    }

    debug!("Resolved bind pose for {} bones", hierarchy.len());
    Ok(BindPose {
        skin_mesh: initial.mesh,
        bind_matrices: hierarchy.bones().iter().map(|b| b.bind_matrix).collect(),
    })
}
