//! Chunk type ids and the typed payload records decoded from them.

use serde::Serialize;

use crate::math::{Mat4, Quat, Vec2, Vec3};

// --- Type ids ---

pub const CHUNK_MESH: u32 = 0xCCCC_0000;
pub const CHUNK_BONE_ANIM: u32 = 0xCCCC_0003;
pub const CHUNK_BONE_NAME_LIST: u32 = 0xCCCC_0005;
pub const CHUNK_NODE: u32 = 0xCCCC_000B;
pub const CHUNK_MTL: u32 = 0xCCCC_000C;
pub const CHUNK_CONTROLLER: u32 = 0xCCCC_000D;
pub const CHUNK_TIMING: u32 = 0xCCCC_000E;
pub const CHUNK_BONE_INITIAL_POS: u32 = 0xCCCC_0012;
pub const CHUNK_DATA_STREAM: u32 = 0xCCCC_0016;
pub const CHUNK_MESH_SUBSETS: u32 = 0xCCCC_0017;
pub const CHUNK_ANIM: u32 = 0xCCCC_0019;

/// Chunk types this crate decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChunkType {
    Mesh,
    BoneAnim,
    BoneNameList,
    Node,
    Mtl,
    Controller,
    Timing,
    BoneInitialPos,
    DataStream,
    MeshSubsets,
    Anim,
    /// Anything else; payload kept as raw bytes
    Unknown(u32),
}

impl ChunkType {
    pub fn from_u32(value: u32) -> Self {
        match value {
            CHUNK_MESH => ChunkType::Mesh,
            CHUNK_BONE_ANIM => ChunkType::BoneAnim,
            CHUNK_BONE_NAME_LIST => ChunkType::BoneNameList,
            CHUNK_NODE => ChunkType::Node,
            CHUNK_MTL => ChunkType::Mtl,
            CHUNK_CONTROLLER => ChunkType::Controller,
            CHUNK_TIMING => ChunkType::Timing,
            CHUNK_BONE_INITIAL_POS => ChunkType::BoneInitialPos,
            CHUNK_DATA_STREAM => ChunkType::DataStream,
            CHUNK_MESH_SUBSETS => ChunkType::MeshSubsets,
            CHUNK_ANIM => ChunkType::Anim,
            other => ChunkType::Unknown(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            ChunkType::Mesh => CHUNK_MESH,
            ChunkType::BoneAnim => CHUNK_BONE_ANIM,
            ChunkType::BoneNameList => CHUNK_BONE_NAME_LIST,
            ChunkType::Node => CHUNK_NODE,
            ChunkType::Mtl => CHUNK_MTL,
            ChunkType::Controller => CHUNK_CONTROLLER,
            ChunkType::Timing => CHUNK_TIMING,
            ChunkType::BoneInitialPos => CHUNK_BONE_INITIAL_POS,
            ChunkType::DataStream => CHUNK_DATA_STREAM,
            ChunkType::MeshSubsets => CHUNK_MESH_SUBSETS,
            ChunkType::Anim => CHUNK_ANIM,
            ChunkType::Unknown(raw) => raw,
        }
    }

    /// Payload versions the decoder understands for this type
    pub fn supported_versions(self) -> &'static [u32] {
        match self {
            ChunkType::Mesh => &[0x744, 0x800],
            ChunkType::BoneAnim => &[0x290],
            ChunkType::BoneNameList => &[0x745],
            ChunkType::Node => &[0x823],
            ChunkType::Mtl => &[0x746],
            ChunkType::Controller => &[0x827],
            ChunkType::Timing => &[0x918],
            ChunkType::BoneInitialPos => &[0x001],
            ChunkType::DataStream => &[0x800],
            ChunkType::MeshSubsets => &[0x800],
            ChunkType::Anim => &[0x001],
            ChunkType::Unknown(_) => &[],
        }
    }
}

/// Resolved reference to another chunk: its position in the graph's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChunkRef(pub(crate) usize);

impl ChunkRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A triangle corner index. Negative (or all-ones) raw values are the
/// sentinel, which downstream code treats as index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VertexRef {
    Index(u32),
    Sentinel,
}

impl VertexRef {
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            VertexRef::Sentinel
        } else {
            VertexRef::Index(raw as u32)
        }
    }

    pub fn resolve(self) -> usize {
        match self {
            VertexRef::Index(i) => i as usize,
            VertexRef::Sentinel => 0,
        }
    }

    pub fn is_sentinel(self) -> bool {
        matches!(self, VertexRef::Sentinel)
    }
}

// ============================================================================
// Animation chunks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRange {
    pub name: String,
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingChunk {
    pub secs_per_tick: f32,
    pub ticks_per_frame: i32,
    pub global_range: TimeRange,
    pub sub_ranges: Vec<TimeRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerKey {
    /// Ticks
    pub time: i32,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Keyframes for one bone; `ctrl_id` is the bone's name hash
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerChunk {
    pub ctrl_id: u32,
    pub keys: Vec<ControllerKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimChunk {
    pub num_keys: u32,
    pub initial_pos: Vec3,
}

// ============================================================================
// Skeleton chunks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneNameListChunk {
    /// Names for display, decoded lossily
    pub names: Vec<String>,
    /// Names as stored; controller hashes are computed over these bytes
    #[serde(skip)]
    pub raw_names: Vec<Vec<u8>>,
}

impl BoneNameListChunk {
    pub fn from_raw(raw_names: Vec<Vec<u8>>) -> Self {
        let names = raw_names
            .iter()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .collect();
        Self { names, raw_names }
    }

    /// Display and stored form of each name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.raw_names.iter().map(Vec::as_slice))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneEntry {
    pub bone_id: i32,
    /// -1 for roots
    pub parent_id: i32,
    pub num_children: u32,
    pub ctrl_id: u32,
    pub custom_property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneAnimChunk {
    pub bones: Vec<BoneEntry>,
}

/// Raw per-bone bind transform in engine space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InitialPosition {
    /// Rotation rows as stored
    pub rotation: [[f32; 3]; 3],
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoneInitialPosChunk {
    /// The skinned mesh
    pub mesh: ChunkRef,
    pub bones: Vec<InitialPosition>,
}

// ============================================================================
// Geometry chunks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawFace {
    pub vertices: [VertexRef; 3],
    pub mat_id: i32,
    pub smoothing_group: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawBoneLink {
    pub bone: i32,
    pub offset: Vec3,
    pub blending: f32,
}

/// Mesh with all vertex data stored inline (format 0x744)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InlineMesh {
    pub in_world_space: bool,
    pub vert_anim_id: i32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub faces: Vec<RawFace>,
    pub uvs: Vec<Vec2>,
    /// One UV triangle per face when UVs are present
    pub uv_faces: Vec<[VertexRef; 3]>,
    /// Per vertex
    pub bone_links: Option<Vec<Vec<RawBoneLink>>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

pub const STREAM_SLOTS: usize = 16;

/// Mesh whose data lives in separate stream chunks (format 0x800)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamedMesh {
    pub flags: i32,
    pub flags2: i32,
    pub num_vertices: u32,
    pub num_indices: u32,
    pub num_subsets: u32,
    pub subsets: Option<ChunkRef>,
    pub vert_anim_id: i32,
    /// Indexed by stream kind
    pub streams: [Option<ChunkRef>; STREAM_SLOTS],
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
}

impl StreamedMesh {
    pub fn stream(&self, kind: StreamKind) -> Option<ChunkRef> {
        self.streams.get(kind.slot()).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MeshChunk {
    Inline(InlineMesh),
    Streamed(StreamedMesh),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamKind {
    Positions,
    Normals,
    Uvs,
    Colors,
    Indices,
    BoneMap,
    Other(u32),
}

impl StreamKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => StreamKind::Positions,
            1 => StreamKind::Normals,
            2 => StreamKind::Uvs,
            3 => StreamKind::Colors,
            5 => StreamKind::Indices,
            9 => StreamKind::BoneMap,
            other => StreamKind::Other(other),
        }
    }

    /// Slot in a streamed mesh's stream id table
    pub fn slot(self) -> usize {
        match self {
            StreamKind::Positions => 0,
            StreamKind::Normals => 1,
            StreamKind::Uvs => 2,
            StreamKind::Colors => 3,
            StreamKind::Indices => 5,
            StreamKind::BoneMap => 9,
            StreamKind::Other(raw) => raw as usize,
        }
    }
}

/// Up to four bone influences for one vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoneMapEntry {
    pub bones: [u8; 4],
    /// Normalized from bytes to 0..=1
    pub weights: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StreamData {
    Positions(Vec<Vec3>),
    Normals(Vec<Vec3>),
    Uvs(Vec<Vec2>),
    Colors(Vec<[u8; 4]>),
    Indices(Vec<VertexRef>),
    BoneMap(Vec<BoneMapEntry>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStreamChunk {
    pub flags: i32,
    pub kind: StreamKind,
    pub element_size: u32,
    pub data: StreamData,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeshSubset {
    pub first_index: u32,
    pub num_indices: u32,
    pub first_vertex: u32,
    pub num_vertices: u32,
    pub mat_id: i32,
    pub radius: f32,
    pub center: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshSubsetsChunk {
    pub flags: u32,
    pub subsets: Vec<MeshSubset>,
}

// ============================================================================
// Scene chunks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MtlType {
    Standard,
    Multi,
    Other(i32),
}

impl MtlType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => MtlType::Standard,
            2 => MtlType::Multi,
            other => MtlType::Other(other),
        }
    }
}

pub const TEXTURE_SLOT_COUNT: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TextureSlot {
    Ambient,
    Diffuse,
    Specular,
    Opacity,
    Bump,
    Gloss,
    Filter,
    ReflectionCube,
    Refraction,
    Subsurface,
    Detail,
}

impl TextureSlot {
    /// Storage order in a material chunk
    pub const ALL: [TextureSlot; TEXTURE_SLOT_COUNT] = [
        TextureSlot::Ambient,
        TextureSlot::Diffuse,
        TextureSlot::Specular,
        TextureSlot::Opacity,
        TextureSlot::Bump,
        TextureSlot::Gloss,
        TextureSlot::Filter,
        TextureSlot::ReflectionCube,
        TextureSlot::Refraction,
        TextureSlot::Subsurface,
        TextureSlot::Detail,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureRef {
    pub slot_type: u8,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MtlChunk {
    pub name: String,
    pub mtl_type: MtlType,
    pub flags: u32,
    pub diffuse: [u8; 3],
    pub specular: [u8; 3],
    pub ambient: [u8; 3],
    pub spec_level: f32,
    pub spec_shininess: f32,
    pub self_illum: f32,
    pub opacity: f32,
    pub alpha_test: f32,
    /// In `TextureSlot::ALL` order
    pub textures: [Option<TextureRef>; TEXTURE_SLOT_COUNT],
    pub children: Vec<ChunkRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeChunk {
    pub name: String,
    pub object: Option<ChunkRef>,
    pub parent: Option<ChunkRef>,
    pub material: Option<ChunkRef>,
    pub is_group_head: bool,
    pub is_group_member: bool,
    /// Column-vector convention, translation in `w_axis`
    pub transform: Mat4,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Position, rotation and scale controller ids
    pub controller_ids: [i32; 3],
    pub property: String,
    pub children: Vec<ChunkRef>,
}

// ============================================================================
// Records
// ============================================================================

/// Tagged payload, one variant per known chunk type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChunkData {
    Mesh(MeshChunk),
    BoneAnim(BoneAnimChunk),
    BoneNameList(BoneNameListChunk),
    Node(NodeChunk),
    Mtl(MtlChunk),
    Controller(ControllerChunk),
    Timing(TimingChunk),
    BoneInitialPos(BoneInitialPosChunk),
    DataStream(DataStreamChunk),
    MeshSubsets(MeshSubsetsChunk),
    Anim(AnimChunk),
    Unknown(Vec<u8>),
}

impl ChunkData {
    /// Multiply every positional quantity in the payload by `scale`.
    /// Controllers are left alone; clips scale their keys when resolved.
    pub(crate) fn apply_scale(&mut self, scale: f32) {
        match self {
            ChunkData::Mesh(MeshChunk::Inline(mesh)) => {
                for p in &mut mesh.positions {
                    *p *= scale;
                }
                if let Some(links) = &mut mesh.bone_links {
                    for link in links.iter_mut().flatten() {
                        link.offset *= scale;
                    }
                }
            }
            ChunkData::Mesh(MeshChunk::Streamed(mesh)) => {
                mesh.bbox_min *= scale;
                mesh.bbox_max *= scale;
            }
            ChunkData::DataStream(stream) => {
                if let StreamData::Positions(positions) = &mut stream.data {
                    for p in positions {
                        *p *= scale;
                    }
                }
            }
            ChunkData::Node(node) => {
                let w = node.transform.w_axis;
                node.transform.w_axis = (w.truncate() * scale).extend(w.w);
                node.position *= scale;
            }
            ChunkData::BoneInitialPos(initial) => {
                for bone in &mut initial.bones {
                    bone.position *= scale;
                }
            }
            ChunkData::Anim(anim) => {
                anim.initial_pos *= scale;
            }
            ChunkData::BoneAnim(_)
            | ChunkData::BoneNameList(_)
            | ChunkData::Mtl(_)
            | ChunkData::Controller(_)
            | ChunkData::Timing(_)
            | ChunkData::MeshSubsets(_)
            | ChunkData::Unknown(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub chunk_id: u32,
    pub chunk_type: ChunkType,
    pub version: u32,
    pub data: ChunkData,
}
