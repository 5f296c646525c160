//! CGF/CAF importer core.
//!
//! Decodes CryEngine chunk containers into plain data: bone hierarchies with
//! bind poses, skin weights, assembled meshes, materials and animation clips.
//! Nothing here builds scene objects; an adapter layer consumes the output.

pub mod animation;
pub mod bone;
pub mod chunk;
pub mod config;
pub mod error;
pub mod material;
pub mod math;
pub mod mesh;
pub mod skin;
pub mod state;

use std::fs;
use std::path::Path;

use log::info;

pub use animation::{infer_project_root, AnimationIndex};
pub use bone::{AnimationClip, AnimationTrack, BindPose, BoneHierarchy, BoneInfo, Keyframe};
pub use chunk::{AssetInfo, ChunkGraph, GameVariant};
pub use config::ImportOptions;
pub use error::{ImportError, Result};
pub use material::Material;
pub use mesh::{Face, MeshGeometry};
pub use skin::SkinWeights;
pub use state::{ClipLoad, ImportSession, ImportedModel};

/// Classify an asset from its header alone
pub fn inspect(path: &Path) -> Result<AssetInfo> {
    let bytes = fs::read(path)?;
    chunk::inspect(&bytes)
}

/// Decode an asset and normalize its units once
pub fn parse(path: &Path, options: &ImportOptions) -> Result<ChunkGraph> {
    let bytes = fs::read(path)?;
    let mut graph = chunk::read(&bytes)?;
    graph.normalize_scale(options.scale_factor);
    info!(
        "Parsed {}: {} chunks",
        path.display(),
        graph.chunks().len()
    );
    Ok(graph)
}

pub fn build_skeleton(graph: &ChunkGraph) -> Result<BoneHierarchy> {
    BoneHierarchy::from_graph(graph)
}

pub fn resolve_bind_pose(
    hierarchy: &mut BoneHierarchy,
    graph: &ChunkGraph,
    options: &ImportOptions,
) -> Result<BindPose> {
    bone::resolve_bind_pose(hierarchy, graph, options.skeleton_auto_connect)
}

/// Every mesh in the asset, placed by its node
pub fn assemble_meshes(graph: &ChunkGraph) -> Result<Vec<MeshGeometry>> {
    mesh::assemble_meshes(graph, &material::material_table(graph))
}

/// The first mesh in the asset
pub fn assemble_mesh(graph: &ChunkGraph) -> Result<MeshGeometry> {
    assemble_meshes(graph)?
        .into_iter()
        .next()
        .ok_or_else(|| ImportError::reference("asset contains no mesh"))
}

pub fn map_skin_weights(
    hierarchy: &BoneHierarchy,
    graph: &ChunkGraph,
    bind_pose: &BindPose,
) -> Result<SkinWeights> {
    skin::map_skin_weights(hierarchy, graph, bind_pose)
}

/// Animation index for a model (or a `.cal` path given directly). A missing
/// index file yields an empty index.
pub fn load_animation_index(path: &Path, options: &ImportOptions) -> Result<AnimationIndex> {
    let is_index = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(animation::INDEX_EXTENSION));
    let (index_path, source) = if is_index {
        (path.to_path_buf(), path.with_extension("cgf"))
    } else {
        match animation::index_path_for(path) {
            Some(index) => (index, path.to_path_buf()),
            None => return Ok(AnimationIndex::default()),
        }
    };
    if !index_path.is_file() {
        return Ok(AnimationIndex::default());
    }

    let project_root = infer_project_root(&source, &options.project_root_markers);
    AnimationIndex::load(&index_path, &source, &project_root)
}

/// Tracks of the clip at `path` for bones of `hierarchy`. Controllers for
/// bones the hierarchy lacks are skipped.
pub fn resolve_animation(
    path: &Path,
    hierarchy: &BoneHierarchy,
    options: &ImportOptions,
) -> Result<AnimationClip> {
    let graph = chunk::read(&fs::read(path)?)?;
    let scale = graph.variant().global_scale(options.scale_factor);
    bone::resolve_clip(
        &animation::clip_name(path),
        &graph,
        &hierarchy.name_table(),
        hierarchy,
        scale,
    )
}
