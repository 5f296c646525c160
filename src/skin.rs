//! Skin weight mapping from per-vertex bone links onto the hierarchy.
//!
//! A later link for the same vertex and bone replaces the earlier weight;
//! weights are never summed.

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;

use crate::bone::{BindPose, BoneHierarchy};
use crate::chunk::{ChunkGraph, ChunkRef, MeshChunk, StreamData, StreamKind};
use crate::error::{ImportError, Result};

/// One raw influence as stored in the asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneLink {
    pub bone: i32,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoneWeight {
    pub bone: usize,
    pub weight: f32,
}

/// Weights one bone exerts, keyed by vertex
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexGroup {
    pub bone: usize,
    pub name: String,
    pub weights: BTreeMap<u32, f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkinWeights {
    /// Mesh the weights belong to
    pub mesh: ChunkRef,
    /// Per vertex, in first-seen bone order
    pub vertices: Vec<Vec<BoneWeight>>,
    /// One group per bone, in bone order
    pub groups: Vec<VertexGroup>,
}

impl SkinWeights {
    pub fn weight(&self, vertex: usize, bone: usize) -> Option<f32> {
        self.vertices
            .get(vertex)?
            .iter()
            .find(|w| w.bone == bone)
            .map(|w| w.weight)
    }
}

/// Map per-vertex links (one list per vertex) onto `hierarchy`.
pub fn map_weights(
    hierarchy: &BoneHierarchy,
    mesh: ChunkRef,
    links: &[Vec<BoneLink>],
) -> Result<SkinWeights> {
    let mut groups: Vec<VertexGroup> = hierarchy
        .bones()
        .iter()
        .map(|b| VertexGroup {
            bone: b.bone_id,
            name: b.name.clone(),
            weights: BTreeMap::new(),
        })
        .collect();

    let mut vertices = Vec::with_capacity(links.len());
    for (vertex, vertex_links) in links.iter().enumerate() {
        let mut weights: Vec<BoneWeight> = Vec::with_capacity(vertex_links.len());
        for link in vertex_links {
            let bone = usize::try_from(link.bone)
                .ok()
                .filter(|&b| b < hierarchy.len())
                .ok_or_else(|| {
                    ImportError::reference(format!(
                        "vertex {} links to bone {} of {}",
                        vertex,
                        link.bone,
                        hierarchy.len()
                    ))
                })?;

            match weights.iter_mut().find(|w| w.bone == bone) {
                Some(existing) => existing.weight = link.weight,
                None => weights.push(BoneWeight {
                    bone,
                    weight: link.weight,
                }),
            }
            groups[bone].weights.insert(vertex as u32, link.weight);
        }
        vertices.push(weights);
    }

    Ok(SkinWeights {
        mesh,
        vertices,
        groups,
    })
}

/// Per-vertex links of `mesh`, from the inline link table or the bone map
/// stream. `None` when the mesh carries no skinning data.
pub fn mesh_bone_links(graph: &ChunkGraph, mesh: ChunkRef) -> Result<Option<Vec<Vec<BoneLink>>>> {
    let chunk = graph.mesh(mesh).ok_or_else(|| {
        ImportError::reference(format!(
            "skin mesh {:#x} is not a mesh chunk",
            graph.get(mesh).chunk_id
        ))
    })?;

    let links = match chunk {
        MeshChunk::Inline(inline) => inline.bone_links.as_ref().map(|per_vertex| {
            per_vertex
                .iter()
                .map(|links| {
                    links
                        .iter()
                        .map(|l| BoneLink {
                            bone: l.bone,
                            weight: l.blending,
                        })
                        .collect()
                })
                .collect()
        }),
        MeshChunk::Streamed(streamed) => {
            let stream = streamed
                .stream(StreamKind::BoneMap)
                .and_then(|r| graph.data_stream(r));
            match stream {
                Some(stream) => match &stream.data {
                    StreamData::BoneMap(entries) => Some(
                        entries
                            .iter()
                            .map(|entry| {
                                // Unused slots carry zero weight
                                entry
                                    .bones
                                    .iter()
                                    .zip(entry.weights)
                                    .filter(|(_, w)| *w > 0.0)
                                    .map(|(&bone, weight)| BoneLink {
                                        bone: bone as i32,
                                        weight,
                                    })
                                    .collect()
                            })
                            .collect(),
                    ),
                    _ => {
                        return Err(ImportError::format(format!(
                            "stream in the bone map slot has kind {:?}",
                            stream.kind
                        )))
                    }
                },
                None => None,
            }
        }
    };
    Ok(links)
}

/// Weights for the mesh the bind pose names as skinned.
pub fn map_skin_weights(
    hierarchy: &BoneHierarchy,
    graph: &ChunkGraph,
    bind_pose: &BindPose,
) -> Result<SkinWeights> {
    let links = mesh_bone_links(graph, bind_pose.skin_mesh)?.unwrap_or_default();
    let weights = map_weights(hierarchy, bind_pose.skin_mesh, &links)?;
    debug!(
        "Mapped weights for {} vertices onto {} bones",
        weights.vertices.len(),
        weights.groups.len()
    );
    Ok(weights)
}
