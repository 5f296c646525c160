//! Per-asset import state with context passing.
//!
//! `ImportSession` holds everything that outlives a single stage: the options,
//! the inferred project root, the bone name table clips resolve against and
//! the clips already loaded. Stages take explicit references to what they
//! need; nothing is global.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::animation::{clip_name, index_path_for, infer_project_root, AnimationIndex};
use crate::bone::{
    bone_name_hash, resolve_bind_pose, resolve_clip, sanitize_bone_name, AnimationClip, BindPose,
    BoneHierarchy, BoneNameTable,
};
use crate::chunk::{self, ChunkGraph};
use crate::config::ImportOptions;
use crate::error::{ImportError, Result};
use crate::material::{material_table, Material};
use crate::mesh::{assemble_meshes, MeshGeometry};
use crate::skin::{map_skin_weights, SkinWeights};

/// Extension of a standalone animation asset
const ANIMATION_EXTENSION: &str = "caf";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClipLoad {
    Loaded(AnimationClip),
    /// A clip with this short name was loaded earlier in the session
    AlreadyLoaded(String),
    NoSuchAction,
}

/// Skeleton with its bind pose and the weights of the skinned mesh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skeleton {
    pub hierarchy: BoneHierarchy,
    pub bind_pose: BindPose,
    pub weights: SkinWeights,
}

/// Everything reconstructed from one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportedModel {
    pub materials: Vec<Material>,
    pub meshes: Vec<MeshGeometry>,
    pub skeleton: Option<Skeleton>,
    pub clips: Vec<AnimationClip>,
}

pub struct ImportSession {
    options: ImportOptions,
    source: PathBuf,
    project_root: PathBuf,
    bone_names: BoneNameTable,
    /// Loaded on first use
    animation_index: Option<AnimationIndex>,
    loaded_clips: Vec<String>,
}

impl ImportSession {
    pub fn new(source: impl Into<PathBuf>, options: ImportOptions) -> Self {
        let source = source.into();
        let project_root = infer_project_root(&source, &options.project_root_markers);
        info!("Project root for {}: {}", source.display(), project_root.display());
        Self {
            options,
            source,
            project_root,
            bone_names: BoneNameTable::default(),
            animation_index: None,
            loaded_clips: Vec::new(),
        }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn bone_names(&self) -> &BoneNameTable {
        &self.bone_names
    }

    pub fn loaded_clips(&self) -> &[String] {
        &self.loaded_clips
    }

    /// Point the session at a new asset and drop all per-asset state
    pub fn reset(&mut self, source: impl Into<PathBuf>) {
        self.source = source.into();
        self.project_root = infer_project_root(&self.source, &self.options.project_root_markers);
        self.bone_names.clear();
        self.animation_index = None;
        self.loaded_clips.clear();
    }

    fn is_animation_source(&self) -> bool {
        self.source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ANIMATION_EXTENSION))
    }

    /// Make the hierarchy's bones the targets clips resolve against
    pub fn register_skeleton(&mut self, hierarchy: &BoneHierarchy) {
        for bone in hierarchy.bones() {
            self.bone_names.insert(bone.name_hash, bone.name.clone());
        }
    }

    /// Index next to the source model. A missing index file is an empty
    /// index, not an error.
    pub fn animation_index(&mut self) -> Result<&AnimationIndex> {
        if self.animation_index.is_none() {
            let index = match index_path_for(&self.source) {
                Some(path) if path.is_file() => {
                    AnimationIndex::load(&path, &self.source, &self.project_root)?
                }
                _ => AnimationIndex::default(),
            };
            self.animation_index = Some(index);
        }
        Ok(self.animation_index.get_or_insert_with(AnimationIndex::default))
    }

    /// Load the clip mapped to `action`, or the source itself when the
    /// source is an animation asset.
    pub fn load_animation(&mut self, action: &str, hierarchy: &BoneHierarchy) -> Result<ClipLoad> {
        let path = if self.is_animation_source() {
            self.source.clone()
        } else {
            match self.animation_index()?.get(action) {
                Some(path) => path.to_path_buf(),
                None => {
                    warn!("No animation mapped to action '{}'", action);
                    return Ok(ClipLoad::NoSuchAction);
                }
            }
        };

        let name = clip_name(&path);
        if self.loaded_clips.contains(&name) {
            return Ok(ClipLoad::AlreadyLoaded(name));
        }

        info!("Loading animation {} as '{}'", path.display(), name);
        let graph = chunk::read(&fs::read(&path)?)?;
        if self.bone_names.is_empty() {
            if let Some(list) = graph.bone_name_list() {
                for (original, raw) in list.iter() {
                    self.bone_names
                        .insert(bone_name_hash(raw), sanitize_bone_name(original));
                }
            }
        }

        let scale = graph.variant().global_scale(self.options.scale_factor);
        let clip = resolve_clip(&name, &graph, &self.bone_names, hierarchy, scale)?;
        self.loaded_clips.push(name);
        Ok(ClipLoad::Loaded(clip))
    }

    /// Load every action in the index, in index order
    pub fn load_animations(&mut self, hierarchy: &BoneHierarchy) -> Result<Vec<AnimationClip>> {
        let actions: Vec<String> = self
            .animation_index()?
            .actions()
            .map(str::to_string)
            .collect();
        if actions.is_empty() {
            info!("No animation index actions for {}", self.source.display());
        }

        let mut clips = Vec::new();
        for action in actions {
            if let ClipLoad::Loaded(clip) = self.load_animation(&action, hierarchy)? {
                clips.push(clip);
            }
        }
        Ok(clips)
    }

    /// Reconstruct the model at the session's source path
    pub fn import_model(&mut self) -> Result<ImportedModel> {
        if self.is_animation_source() {
            return Err(ImportError::format(format!(
                "{} is an animation, not a model",
                self.source.display()
            )));
        }

        let graph = crate::parse(&self.source, &self.options)?;
        let table = material_table(&graph);
        let meshes = assemble_meshes(&graph, &table)?;
        let materials = table.into_iter().map(|(_, m)| m).collect();

        let skeleton = if self.options.import_skeleton {
            self.skeleton(&graph)?
        } else {
            None
        };

        let clips = match &skeleton {
            Some(skeleton) if self.options.import_animations => {
                self.load_animations(&skeleton.hierarchy)?
            }
            _ => Vec::new(),
        };

        Ok(ImportedModel {
            materials,
            meshes,
            skeleton,
            clips,
        })
    }

    fn skeleton(&mut self, graph: &ChunkGraph) -> Result<Option<Skeleton>> {
        let mut hierarchy = BoneHierarchy::from_graph(graph)?;
        if hierarchy.is_empty() {
            return Ok(None);
        }
        let bind_pose =
            resolve_bind_pose(&mut hierarchy, graph, self.options.skeleton_auto_connect)?;
        let weights = map_skin_weights(&hierarchy, graph, &bind_pose)?;
        self.register_skeleton(&hierarchy);
        Ok(Some(Skeleton {
            hierarchy,
            bind_pose,
            weights,
        }))
    }
}
