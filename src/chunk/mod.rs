//! Chunk graph: the decoded container with every reference resolved.
//!
//! Organized into:
//! - `types` - chunk type ids and typed payload records
//! - `reader` - header, table and payload decoding

#[cfg(test)]
pub(crate) mod builder;
mod reader;
mod types;

use std::collections::HashMap;
use std::fmt;

use log::{info, warn};
use serde::Serialize;

pub use reader::{
    inspect, read, AssetInfo, ContainerHeader, FileType, FILE_TYPE_ANIMATION, FILE_TYPE_GEOMETRY,
    FORMAT_VERSION_744, FORMAT_VERSION_746, SIGNATURE_AION, SIGNATURE_CRYTEK,
};
pub use types::*;

/// Which engine generation wrote the asset; decides the unit scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GameVariant {
    FarCry,
    Crysis,
    Aion,
}

impl GameVariant {
    /// Factor every positional quantity is multiplied by during import.
    /// Positions are multiplied by this factor, never by its reciprocal, in
    /// meshes, bind poses and clip keys alike: Crysis units shrink by 100
    /// and Aion units grow by 100.
    pub fn global_scale(self, scale_factor: f32) -> f32 {
        match self {
            GameVariant::Crysis => scale_factor / 100.0,
            GameVariant::Aion => scale_factor * 100.0,
            GameVariant::FarCry => scale_factor,
        }
    }

    pub fn user_version(self) -> u32 {
        match self {
            GameVariant::FarCry => 1,
            GameVariant::Crysis => 2,
            GameVariant::Aion => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GameVariant::FarCry => "Far Cry",
            GameVariant::Crysis => "Crysis",
            GameVariant::Aion => "Aion",
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkGraph {
    header: ContainerHeader,
    chunks: Vec<Chunk>,
    #[serde(skip)]
    by_id: HashMap<u32, ChunkRef>,
    /// Scale applied by `normalize_scale`, once
    applied_scale: Option<f32>,
}

impl ChunkGraph {
    pub(crate) fn new(header: ContainerHeader, chunks: Vec<Chunk>) -> Self {
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.chunk_id, ChunkRef(i)))
            .collect();
        Self {
            header,
            chunks,
            by_id,
            applied_scale: None,
        }
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn variant(&self) -> GameVariant {
        self.header.variant
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Header summary, matching what `inspect` reports for the same bytes
    pub fn asset_info(&self) -> AssetInfo {
        AssetInfo {
            game_variant: self.header.variant,
            format_version: self.header.format_version,
            user_version: self.header.variant.user_version(),
            file_type: self.header.file_type,
            chunk_count: self.chunks.len() as u32,
        }
    }

    /// References handed out by this graph are always in range
    pub fn get(&self, r: ChunkRef) -> &Chunk {
        &self.chunks[r.0]
    }

    pub fn ref_of(&self, chunk_id: u32) -> Option<ChunkRef> {
        self.by_id.get(&chunk_id).copied()
    }

    pub fn by_id(&self, chunk_id: u32) -> Option<&Chunk> {
        self.ref_of(chunk_id).map(|r| self.get(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkRef, &Chunk)> {
        self.chunks.iter().enumerate().map(|(i, c)| (ChunkRef(i), c))
    }

    fn first<'a, T>(&'a self, pick: impl Fn(&'a ChunkData) -> Option<&'a T>) -> Option<&'a T> {
        self.chunks.iter().find_map(|c| pick(&c.data))
    }

    pub fn bone_name_list(&self) -> Option<&BoneNameListChunk> {
        self.first(|d| match d {
            ChunkData::BoneNameList(c) => Some(c),
            _ => None,
        })
    }

    pub fn bone_anim(&self) -> Option<&BoneAnimChunk> {
        self.first(|d| match d {
            ChunkData::BoneAnim(c) => Some(c),
            _ => None,
        })
    }

    pub fn bone_initial_pos(&self) -> Option<&BoneInitialPosChunk> {
        self.first(|d| match d {
            ChunkData::BoneInitialPos(c) => Some(c),
            _ => None,
        })
    }

    pub fn timing(&self) -> Option<&TimingChunk> {
        self.first(|d| match d {
            ChunkData::Timing(c) => Some(c),
            _ => None,
        })
    }

    pub fn anim(&self) -> Option<&AnimChunk> {
        self.first(|d| match d {
            ChunkData::Anim(c) => Some(c),
            _ => None,
        })
    }

    pub fn controllers(&self) -> impl Iterator<Item = &ControllerChunk> {
        self.chunks.iter().filter_map(|c| match &c.data {
            ChunkData::Controller(ctrl) => Some(ctrl),
            _ => None,
        })
    }

    pub fn materials(&self) -> impl Iterator<Item = (ChunkRef, &MtlChunk)> {
        self.iter().filter_map(|(r, c)| match &c.data {
            ChunkData::Mtl(mtl) => Some((r, mtl)),
            _ => None,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = (ChunkRef, &NodeChunk)> {
        self.iter().filter_map(|(r, c)| match &c.data {
            ChunkData::Node(node) => Some((r, node)),
            _ => None,
        })
    }

    pub fn mesh(&self, r: ChunkRef) -> Option<&MeshChunk> {
        match &self.get(r).data {
            ChunkData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn data_stream(&self, r: ChunkRef) -> Option<&DataStreamChunk> {
        match &self.get(r).data {
            ChunkData::DataStream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn mesh_subsets(&self, r: ChunkRef) -> Option<&MeshSubsetsChunk> {
        match &self.get(r).data {
            ChunkData::MeshSubsets(subsets) => Some(subsets),
            _ => None,
        }
    }

    pub fn mtl(&self, r: ChunkRef) -> Option<&MtlChunk> {
        match &self.get(r).data {
            ChunkData::Mtl(mtl) => Some(mtl),
            _ => None,
        }
    }

    /// Scale applied so far, if normalization has run
    pub fn applied_scale(&self) -> Option<f32> {
        self.applied_scale
    }

    /// Multiply every positional quantity by this variant's global scale.
    ///
    /// Runs at most once per graph; later calls log and return `false`.
    pub fn normalize_scale(&mut self, scale_factor: f32) -> bool {
        if let Some(applied) = self.applied_scale {
            warn!(
                "Scale already normalized (x{}), ignoring second request",
                applied
            );
            return false;
        }
        let scale = self.variant().global_scale(scale_factor);
        info!("{} asset, global scale {}", self.variant(), scale);
        for chunk in &mut self.chunks {
            chunk.data.apply_scale(scale);
        }
        self.applied_scale = Some(scale);
        true
    }
}
