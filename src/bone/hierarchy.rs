//! Bone hierarchy built from the name list and bone entry chunks.
//!
//! Bones live in one arena ordered by bone id; parent and children are
//! indices into it, so the tree never owns a bone twice.

use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use crate::chunk::{BoneAnimChunk, BoneNameListChunk, ChunkGraph};
use crate::error::{ImportError, Result};
use crate::math::{Mat4, Vec3};

/// Join key between a bone and the animation controllers that drive it:
/// CRC-32 of the name bytes as stored in the asset.
pub fn bone_name_hash(raw_name: impl AsRef<[u8]>) -> u32 {
    crc32fast::hash(raw_name.as_ref())
}

/// Name used for the bone downstream
pub fn sanitize_bone_name(name: &str) -> String {
    name.replace(' ', "_")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneInfo {
    /// Index into the hierarchy
    pub bone_id: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub name: String,
    pub name_hash: u32,
    /// Object-space bind transform, set by the bind pose resolver
    pub bind_matrix: Mat4,
    /// Copy of `bind_matrix` before any later mutation
    pub origin_matrix: Mat4,
    pub head: Vec3,
    pub tail: Vec3,
    pub roll: f32,
    /// Head sits on the parent's tail
    pub connected: bool,
}

impl BoneInfo {
    fn new(bone_id: usize, original_name: &str, raw_name: &[u8]) -> Self {
        Self {
            bone_id,
            parent: None,
            children: Vec::new(),
            name: sanitize_bone_name(original_name),
            name_hash: bone_name_hash(raw_name),
            bind_matrix: Mat4::IDENTITY,
            origin_matrix: Mat4::IDENTITY,
            head: Vec3::ZERO,
            tail: Vec3::ZERO,
            roll: 0.0,
            connected: false,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoneHierarchy {
    bones: Vec<BoneInfo>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl BoneHierarchy {
    /// Link `names` and `entries` (index-aligned) into a validated forest
    pub fn build(names: &BoneNameListChunk, entries: &BoneAnimChunk) -> Result<Self> {
        let num_bones = names.names.len();
        if entries.bones.len() != num_bones {
            return Err(ImportError::validation(format!(
                "{} bone names but {} bone entries",
                num_bones,
                entries.bones.len()
            )));
        }

        let mut bones: Vec<BoneInfo> = names
            .iter()
            .enumerate()
            .map(|(i, (name, raw))| BoneInfo::new(i, name, raw))
            .collect();

        for (i, entry) in entries.bones.iter().enumerate() {
            if entry.bone_id != i as i32 {
                return Err(ImportError::validation(format!(
                    "bone entry {} has id {}, ids must be dense and ordered",
                    i, entry.bone_id
                )));
            }
            if entry.parent_id == -1 {
                continue;
            }
            let parent = usize::try_from(entry.parent_id)
                .ok()
                .filter(|&p| p < num_bones)
                .ok_or_else(|| {
                    ImportError::validation(format!(
                        "bone '{}' has parent id {} outside 0..{}",
                        bones[i].name, entry.parent_id, num_bones
                    ))
                })?;
            bones[i].parent = Some(parent);
        }

        // Every parent chain has to reach a root within num_bones steps
        for start in 0..num_bones {
            let mut current = bones[start].parent;
            let mut steps = 0;
            while let Some(p) = current {
                steps += 1;
                if steps > num_bones {
                    return Err(ImportError::validation(format!(
                        "bone '{}' is part of a parent cycle",
                        bones[start].name
                    )));
                }
                current = bones[p].parent;
            }
        }

        for i in 0..num_bones {
            if let Some(p) = bones[i].parent {
                bones[p].children.push(i);
            }
        }

        let mut by_name = HashMap::with_capacity(num_bones);
        for bone in &bones {
            if by_name.insert(bone.name.clone(), bone.bone_id).is_some() {
                return Err(ImportError::validation(format!(
                    "duplicate bone name '{}'",
                    bone.name
                )));
            }
        }

        for (i, entry) in entries.bones.iter().enumerate() {
            if entry.num_children as usize != bones[i].children.len() {
                warn!(
                    "Bone '{}' declares {} children but has {}",
                    bones[i].name,
                    entry.num_children,
                    bones[i].children.len()
                );
            }
        }

        debug!("Built hierarchy of {} bones", num_bones);
        Ok(Self { bones, by_name })
    }

    /// Build from the graph's skeleton chunks. Assets without a skeleton give
    /// an empty hierarchy.
    pub fn from_graph(graph: &ChunkGraph) -> Result<Self> {
        match (graph.bone_name_list(), graph.bone_anim()) {
            (Some(names), Some(entries)) => Self::build(names, entries),
            (None, None) => Ok(Self::default()),
            (Some(_), None) => Err(ImportError::validation("bone names without bone entries")),
            (None, Some(_)) => Err(ImportError::validation("bone entries without bone names")),
        }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[BoneInfo] {
        &self.bones
    }

    pub(crate) fn bones_mut(&mut self) -> &mut [BoneInfo] {
        &mut self.bones
    }

    pub fn get(&self, index: usize) -> Option<&BoneInfo> {
        self.bones.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn find(&self, name: &str) -> Option<&BoneInfo> {
        self.index_of(name).map(|i| &self.bones[i])
    }

    pub fn roots(&self) -> impl Iterator<Item = &BoneInfo> {
        self.bones.iter().filter(|b| b.is_root())
    }

    /// Parent chain of `index`, nearest first
    pub fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.bones.get(index).and_then(|b| b.parent), move |&p| {
            self.bones[p].parent
        })
    }

    /// Indices ordered so every parent precedes its children
    pub fn topological_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.bones.len());
        let mut stack: Vec<usize> = self
            .bones
            .iter()
            .rev()
            .filter(|b| b.is_root())
            .map(|b| b.bone_id)
            .collect();
        while let Some(i) = stack.pop() {
            order.push(i);
            stack.extend(self.bones[i].children.iter().rev());
        }
        order
    }

    pub fn name_table(&self) -> BoneNameTable {
        let mut table = BoneNameTable::default();
        for bone in &self.bones {
            table.insert(bone.name_hash, bone.name.clone());
        }
        table
    }
}

/// Name hash to bone name, shared between a model and its clips
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoneNameTable(HashMap<u32, String>);

impl BoneNameTable {
    pub fn insert(&mut self, hash: u32, name: String) {
        self.0.insert(hash, name);
    }

    pub fn resolve(&self, hash: u32) -> Option<&str> {
        self.0.get(&hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
