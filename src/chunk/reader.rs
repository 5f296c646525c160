//! Container decoding: header, chunk table and typed payloads.
//!
//! The reader works on an in-memory byte slice. References between chunks are
//! resolved while payloads are decoded, so a graph that comes out of `read`
//! never holds a dangling id.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use serde::Serialize;

use super::types::*;
use super::{ChunkGraph, GameVariant};
use crate::error::{ImportError, Result};
use crate::math::{engine_matrix44, Quat, Vec2, Vec3};

// --- Constants ---

pub const SIGNATURE_CRYTEK: &[u8; 8] = b"CryTek\0\0";
pub const SIGNATURE_AION: &[u8; 8] = b"NCAion\0\0";

pub const FILE_TYPE_GEOMETRY: u32 = 0xFFFF_0000;
pub const FILE_TYPE_ANIMATION: u32 = 0xFFFF_0001;

pub const FORMAT_VERSION_744: u32 = 0x744;
pub const FORMAT_VERSION_746: u32 = 0x746;

/// Signature plus file type, format version and table offset
pub const HEADER_SIZE: usize = 20;

const NAME_LEN_BONE_PROPERTY: usize = 32;
const NAME_LEN_RANGE: usize = 32;
const NAME_LEN_NODE: usize = 64;
const NAME_LEN_MTL: usize = 128;
const NAME_LEN_TEXTURE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileType {
    Geometry,
    Animation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerHeader {
    pub variant: GameVariant,
    pub file_type: FileType,
    pub format_version: u32,
    pub table_offset: u32,
}

impl ContainerHeader {
    fn table_entry_size(&self) -> usize {
        if self.format_version == FORMAT_VERSION_746 {
            20
        } else {
            16
        }
    }
}

/// Result of a header-only look at a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    pub game_variant: GameVariant,
    pub format_version: u32,
    pub user_version: u32,
    pub file_type: FileType,
    pub chunk_count: u32,
}

#[derive(Debug, Clone, Copy)]
struct TableEntry {
    type_id: u32,
    version: u32,
    offset: u32,
    chunk_id: u32,
    size: u32,
}

// ============================================================================
// Cursor
// ============================================================================

/// Little-endian cursor over a byte slice
pub(crate) struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ImportError::format(format!(
                "unexpected end of data: wanted {} bytes at offset {}, {} left",
                len,
                self.cursor,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0; N];
        LittleEndian::read_f32_into(self.take(N * 4)?, &mut out);
        Ok(out)
    }

    pub(crate) fn read_vec2(&mut self) -> Result<Vec2> {
        Ok(Vec2::from(self.read_f32s::<2>()?))
    }

    pub(crate) fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::from(self.read_f32s::<3>()?))
    }

    /// Stored as x, y, z, w
    pub(crate) fn read_quat(&mut self) -> Result<Quat> {
        let [x, y, z, w] = self.read_f32s::<4>()?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    fn read_rgb(&mut self) -> Result<[u8; 3]> {
        let b = self.take(3)?;
        Ok([b[0], b[1], b[2]])
    }

    /// NUL-padded fixed-width string
    pub(crate) fn read_fixed_string(&mut self, len: usize) -> Result<String> {
        let raw = self.take(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// NUL-terminated byte string, terminator consumed
    pub(crate) fn read_cstring(&mut self) -> Result<&'a [u8]> {
        let bytes: &'a [u8] = self.bytes;
        let rest = &bytes[self.cursor.min(bytes.len())..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ImportError::format("unterminated string"))?;
        self.cursor += end + 1;
        Ok(&rest[..end])
    }

    /// Element count that must fit in the remaining bytes at `element_size`
    /// bytes per element.
    pub(crate) fn read_count(&mut self, element_size: usize) -> Result<usize> {
        let raw = self.read_i32()?;
        self.check_count(raw, element_size)
    }

    fn check_count(&self, raw: i32, element_size: usize) -> Result<usize> {
        let count = usize::try_from(raw)
            .map_err(|_| ImportError::format(format!("negative element count {}", raw)))?;
        if count.saturating_mul(element_size) > self.remaining() {
            return Err(ImportError::format(format!(
                "{} elements of {} bytes exceed the {} bytes left",
                count,
                element_size,
                self.remaining()
            )));
        }
        Ok(count)
    }
}

// ============================================================================
// Header and table
// ============================================================================

pub(crate) fn parse_header(bytes: &[u8]) -> Result<ContainerHeader> {
    if bytes.len() < HEADER_SIZE {
        return Err(ImportError::format(format!(
            "stream of {} bytes is shorter than the container header",
            bytes.len()
        )));
    }
    let mut input = BinaryInput::new(bytes);
    let signature = input.take(8)?;
    let file_type = input.read_u32()?;
    let format_version = input.read_u32()?;
    let table_offset = input.read_u32()?;

    let variant = match (signature, format_version) {
        (s, FORMAT_VERSION_744 | FORMAT_VERSION_746) if s == SIGNATURE_AION => GameVariant::Aion,
        (s, FORMAT_VERSION_746) if s == SIGNATURE_CRYTEK => GameVariant::Crysis,
        (s, FORMAT_VERSION_744) if s == SIGNATURE_CRYTEK => GameVariant::FarCry,
        (s, version) if s == SIGNATURE_CRYTEK || s == SIGNATURE_AION => {
            return Err(ImportError::format(format!(
                "unsupported format version {:#x}",
                version
            )))
        }
        _ => {
            return Err(ImportError::format(format!(
                "bad signature {:?}",
                String::from_utf8_lossy(signature)
            )))
        }
    };

    let file_type = match file_type {
        FILE_TYPE_GEOMETRY => FileType::Geometry,
        FILE_TYPE_ANIMATION => FileType::Animation,
        other => {
            return Err(ImportError::format(format!(
                "unknown file type {:#010x}",
                other
            )))
        }
    };

    Ok(ContainerHeader {
        variant,
        file_type,
        format_version,
        table_offset,
    })
}

/// Chunk count declared at the table offset, checked against stream length
fn read_table_count(bytes: &[u8], header: &ContainerHeader) -> Result<u32> {
    let offset = header.table_offset as usize;
    let count = bytes
        .get(offset..offset.saturating_add(4))
        .filter(|b| b.len() == 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| {
            ImportError::format(format!(
                "chunk table offset {} outside stream of {} bytes",
                offset,
                bytes.len()
            ))
        })?;

    let table_end = (offset as u64) + 4 + (count as u64) * (header.table_entry_size() as u64);
    if table_end > bytes.len() as u64 {
        return Err(ImportError::format(format!(
            "chunk table of {} entries ends at {} past stream of {} bytes",
            count,
            table_end,
            bytes.len()
        )));
    }
    Ok(count)
}

fn read_table(bytes: &[u8], header: &ContainerHeader) -> Result<Vec<TableEntry>> {
    let count = read_table_count(bytes, header)?;
    let mut input = BinaryInput::new(&bytes[header.table_offset as usize + 4..]);
    let has_size = header.format_version == FORMAT_VERSION_746;

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let type_id = input.read_u32()?;
        let version = input.read_u32()?;
        let offset = input.read_u32()?;
        let chunk_id = input.read_u32()?;
        let size = if has_size { input.read_u32()? } else { 0 };
        entries.push(TableEntry {
            type_id,
            version,
            offset,
            chunk_id,
            size,
        });
    }

    if !has_size {
        // Sizes are implicit: up to the next payload or the table itself
        let mut boundaries: Vec<u32> = entries.iter().map(|e| e.offset).collect();
        boundaries.push(header.table_offset);
        boundaries.sort_unstable();
        boundaries.dedup();
        for entry in &mut entries {
            let end = boundaries
                .iter()
                .copied()
                .find(|&b| b > entry.offset)
                .unwrap_or(bytes.len() as u32);
            entry.size = end.saturating_sub(entry.offset);
        }
    }

    Ok(entries)
}

/// Classify a container from its header without decoding any payload
pub fn inspect(bytes: &[u8]) -> Result<AssetInfo> {
    let header = parse_header(bytes)?;
    let chunk_count = read_table_count(bytes, &header)?;
    Ok(AssetInfo {
        game_variant: header.variant,
        format_version: header.format_version,
        user_version: header.variant.user_version(),
        file_type: header.file_type,
        chunk_count,
    })
}

// ============================================================================
// Payloads
// ============================================================================

/// Resolves raw chunk ids for the chunk currently being decoded
struct Linker<'a> {
    index: &'a HashMap<u32, (usize, ChunkType)>,
    owner: u32,
}

impl Linker<'_> {
    fn require(&self, id: u32, field: &str, expected: Option<ChunkType>) -> Result<ChunkRef> {
        let &(index, found) = self.index.get(&id).ok_or_else(|| {
            ImportError::reference(format!(
                "chunk {:#x} {} refers to missing chunk {:#x}",
                self.owner, field, id
            ))
        })?;
        if let Some(expected) = expected {
            if found != expected {
                return Err(ImportError::reference(format!(
                    "chunk {:#x} {} refers to chunk {:#x} of type {:?}, expected {:?}",
                    self.owner, field, id, found, expected
                )));
            }
        }
        Ok(ChunkRef(index))
    }

    /// Ids <= 0 mean "no reference"
    fn optional(&self, id: i32, field: &str, expected: Option<ChunkType>) -> Result<Option<ChunkRef>> {
        if id <= 0 {
            Ok(None)
        } else {
            self.require(id as u32, field, expected).map(Some)
        }
    }
}

fn decode_timing(input: &mut BinaryInput) -> Result<TimingChunk> {
    let secs_per_tick = input.read_f32()?;
    let ticks_per_frame = input.read_i32()?;
    let global_range = read_range(input)?;
    let num_sub_ranges = input.read_count(NAME_LEN_RANGE + 8)?;
    let sub_ranges = (0..num_sub_ranges)
        .map(|_| read_range(input))
        .collect::<Result<Vec<_>>>()?;
    Ok(TimingChunk {
        secs_per_tick,
        ticks_per_frame,
        global_range,
        sub_ranges,
    })
}

fn read_range(input: &mut BinaryInput) -> Result<TimeRange> {
    Ok(TimeRange {
        name: input.read_fixed_string(NAME_LEN_RANGE)?,
        start: input.read_i32()?,
        end: input.read_i32()?,
    })
}

fn decode_bone_name_list(input: &mut BinaryInput) -> Result<BoneNameListChunk> {
    // Each name takes at least its terminator
    let num_names = input.read_count(1)?;
    let raw_names = (0..num_names)
        .map(|_| input.read_cstring().map(<[u8]>::to_vec))
        .collect::<Result<Vec<_>>>()?;
    Ok(BoneNameListChunk::from_raw(raw_names))
}

fn decode_bone_anim(input: &mut BinaryInput) -> Result<BoneAnimChunk> {
    let num_bones = input.read_count(16 + NAME_LEN_BONE_PROPERTY)?;
    let mut bones = Vec::with_capacity(num_bones);
    for _ in 0..num_bones {
        bones.push(BoneEntry {
            bone_id: input.read_i32()?,
            parent_id: input.read_i32()?,
            num_children: input.read_u32()?,
            ctrl_id: input.read_u32()?,
            custom_property: input.read_fixed_string(NAME_LEN_BONE_PROPERTY)?,
        });
    }
    Ok(BoneAnimChunk { bones })
}

fn decode_bone_initial_pos(input: &mut BinaryInput, linker: &Linker) -> Result<BoneInitialPosChunk> {
    let mesh = linker.require(input.read_u32()?, "mesh", Some(ChunkType::Mesh))?;
    let num_bones = input.read_count(48)?;
    let mut bones = Vec::with_capacity(num_bones);
    for _ in 0..num_bones {
        let m = input.read_f32s::<12>()?;
        bones.push(InitialPosition {
            rotation: [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]],
            position: Vec3::new(m[9], m[10], m[11]),
        });
    }
    Ok(BoneInitialPosChunk { mesh, bones })
}

fn decode_inline_mesh(input: &mut BinaryInput) -> Result<InlineMesh> {
    let has_bone_info = input.read_bool()?;
    let has_vertex_colors = input.read_bool()?;
    let in_world_space = input.read_bool()?;
    input.skip(1)?;
    let num_vertices = input.read_count(0)?;
    let num_uvs = input.read_count(0)?;
    let num_faces = input.read_count(0)?;
    let vert_anim_id = input.read_i32()?;

    input.check_count(num_vertices as i32, 24)?;
    let mut positions = Vec::with_capacity(num_vertices);
    let mut normals = Vec::with_capacity(num_vertices);
    for _ in 0..num_vertices {
        positions.push(input.read_vec3()?);
        normals.push(input.read_vec3()?);
    }

    input.check_count(num_faces as i32, 20)?;
    let mut faces = Vec::with_capacity(num_faces);
    for _ in 0..num_faces {
        let vertices = [
            VertexRef::from_raw(input.read_i32()?),
            VertexRef::from_raw(input.read_i32()?),
            VertexRef::from_raw(input.read_i32()?),
        ];
        faces.push(RawFace {
            vertices,
            mat_id: input.read_i32()?,
            smoothing_group: input.read_i32()?,
        });
    }

    input.check_count(num_uvs as i32, 8)?;
    let uvs = (0..num_uvs)
        .map(|_| input.read_vec2())
        .collect::<Result<Vec<_>>>()?;

    let mut uv_faces = Vec::new();
    if num_uvs > 0 {
        input.check_count(num_faces as i32, 12)?;
        uv_faces.reserve(num_faces);
        for _ in 0..num_faces {
            uv_faces.push([
                VertexRef::from_raw(input.read_i32()?),
                VertexRef::from_raw(input.read_i32()?),
                VertexRef::from_raw(input.read_i32()?),
            ]);
        }
    }

    let bone_links = if has_bone_info {
        let mut per_vertex = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            // bone, offset, blending
            let num_links = input.read_count(20)?;
            let mut links = Vec::with_capacity(num_links);
            for _ in 0..num_links {
                links.push(RawBoneLink {
                    bone: input.read_i32()?,
                    offset: input.read_vec3()?,
                    blending: input.read_f32()?,
                });
            }
            per_vertex.push(links);
        }
        Some(per_vertex)
    } else {
        None
    };

    let colors = if has_vertex_colors {
        input.check_count(num_vertices as i32, 3)?;
        Some(
            (0..num_vertices)
                .map(|_| input.read_rgb())
                .collect::<Result<Vec<_>>>()?,
        )
    } else {
        None
    };

    Ok(InlineMesh {
        in_world_space,
        vert_anim_id,
        positions,
        normals,
        faces,
        uvs,
        uv_faces,
        bone_links,
        colors,
    })
}

fn decode_streamed_mesh(input: &mut BinaryInput, linker: &Linker) -> Result<StreamedMesh> {
    let flags = input.read_i32()?;
    let flags2 = input.read_i32()?;
    let num_vertices = input.read_count(0)? as u32;
    let num_indices = input.read_count(0)? as u32;
    let num_subsets = input.read_count(0)? as u32;
    let subsets = linker.optional(input.read_i32()?, "subsets", Some(ChunkType::MeshSubsets))?;
    let vert_anim_id = input.read_i32()?;

    let mut streams = [None; STREAM_SLOTS];
    for (slot, stream) in streams.iter_mut().enumerate() {
        let field = format!("stream[{}]", slot);
        *stream = linker.optional(input.read_i32()?, &field, Some(ChunkType::DataStream))?;
    }

    Ok(StreamedMesh {
        flags,
        flags2,
        num_vertices,
        num_indices,
        num_subsets,
        subsets,
        vert_anim_id,
        streams,
        bbox_min: input.read_vec3()?,
        bbox_max: input.read_vec3()?,
    })
}

fn decode_data_stream(input: &mut BinaryInput) -> Result<DataStreamChunk> {
    let flags = input.read_i32()?;
    let kind = StreamKind::from_u32(input.read_u32()?);
    let num_elements = input.read_count(0)?;
    let element_size = input.read_count(0)?;
    input.skip(8)?;
    input.check_count(num_elements as i32, element_size)?;

    let expect_size = |sizes: &[usize]| -> Result<()> {
        if sizes.contains(&element_size) {
            Ok(())
        } else {
            Err(ImportError::format(format!(
                "{:?} stream with element size {}",
                kind, element_size
            )))
        }
    };

    let data = match kind {
        StreamKind::Positions | StreamKind::Normals => {
            expect_size(&[12])?;
            let v = (0..num_elements)
                .map(|_| input.read_vec3())
                .collect::<Result<Vec<_>>>()?;
            if kind == StreamKind::Positions {
                StreamData::Positions(v)
            } else {
                StreamData::Normals(v)
            }
        }
        StreamKind::Uvs => {
            expect_size(&[8])?;
            StreamData::Uvs(
                (0..num_elements)
                    .map(|_| input.read_vec2())
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        StreamKind::Colors => {
            expect_size(&[4])?;
            let mut colors = Vec::with_capacity(num_elements);
            for _ in 0..num_elements {
                let b = input.take(4)?;
                colors.push([b[0], b[1], b[2], b[3]]);
            }
            StreamData::Colors(colors)
        }
        StreamKind::Indices => {
            expect_size(&[2, 4])?;
            let mut indices = Vec::with_capacity(num_elements);
            for _ in 0..num_elements {
                let index = if element_size == 2 {
                    match input.read_u16()? {
                        u16::MAX => VertexRef::Sentinel,
                        i => VertexRef::Index(i as u32),
                    }
                } else {
                    match input.read_u32()? {
                        u32::MAX => VertexRef::Sentinel,
                        i => VertexRef::Index(i),
                    }
                };
                indices.push(index);
            }
            StreamData::Indices(indices)
        }
        StreamKind::BoneMap => {
            expect_size(&[8])?;
            let mut entries = Vec::with_capacity(num_elements);
            for _ in 0..num_elements {
                let b = input.take(8)?;
                entries.push(BoneMapEntry {
                    bones: [b[0], b[1], b[2], b[3]],
                    weights: [b[4], b[5], b[6], b[7]].map(|w| w as f32 / 255.0),
                });
            }
            StreamData::BoneMap(entries)
        }
        StreamKind::Other(_) => StreamData::Raw(input.take(num_elements * element_size)?.to_vec()),
    };

    Ok(DataStreamChunk {
        flags,
        kind,
        element_size: element_size as u32,
        data,
    })
}

fn decode_mesh_subsets(input: &mut BinaryInput) -> Result<MeshSubsetsChunk> {
    let flags = input.read_u32()?;
    let num_subsets = input.read_count(0)?;
    input.skip(8)?;
    input.check_count(num_subsets as i32, 36)?;

    let mut subsets = Vec::with_capacity(num_subsets);
    for _ in 0..num_subsets {
        subsets.push(MeshSubset {
            first_index: input.read_count(0)? as u32,
            num_indices: input.read_count(0)? as u32,
            first_vertex: input.read_count(0)? as u32,
            num_vertices: input.read_count(0)? as u32,
            mat_id: input.read_i32()?,
            radius: input.read_f32()?,
            center: input.read_vec3()?,
        });
    }
    Ok(MeshSubsetsChunk { flags, subsets })
}

fn decode_mtl(input: &mut BinaryInput, linker: &Linker) -> Result<MtlChunk> {
    let name = input.read_fixed_string(NAME_LEN_MTL)?;
    let mtl_type = MtlType::from_i32(input.read_i32()?);
    let flags = input.read_u32()?;
    let diffuse = input.read_rgb()?;
    let specular = input.read_rgb()?;
    let ambient = input.read_rgb()?;
    input.skip(1)?;
    let spec_level = input.read_f32()?;
    let spec_shininess = input.read_f32()?;
    let self_illum = input.read_f32()?;
    let opacity = input.read_f32()?;
    let alpha_test = input.read_f32()?;

    let mut textures: [Option<TextureRef>; TEXTURE_SLOT_COUNT] = Default::default();
    for texture in textures.iter_mut() {
        let slot_type = input.read_u8()?;
        input.skip(3)?;
        let path = input.read_fixed_string(NAME_LEN_TEXTURE)?;
        if slot_type > 0 {
            *texture = Some(TextureRef { slot_type, path });
        }
    }

    let num_children = input.read_count(4)?;
    let mut children = Vec::with_capacity(num_children);
    for _ in 0..num_children {
        if let Some(child) = linker.optional(input.read_i32()?, "child", Some(ChunkType::Mtl))? {
            children.push(child);
        }
    }

    Ok(MtlChunk {
        name,
        mtl_type,
        flags,
        diffuse,
        specular,
        ambient,
        spec_level,
        spec_shininess,
        self_illum,
        opacity,
        alpha_test,
        textures,
        children,
    })
}

fn decode_node(input: &mut BinaryInput, linker: &Linker) -> Result<NodeChunk> {
    let name = input.read_fixed_string(NAME_LEN_NODE)?;
    let object = linker.optional(input.read_i32()?, "object", None)?;
    let parent = linker.optional(input.read_i32()?, "parent", Some(ChunkType::Node))?;
    let num_children = input.read_count(0)?;
    let material = linker.optional(input.read_i32()?, "material", Some(ChunkType::Mtl))?;
    let is_group_head = input.read_bool()?;
    let is_group_member = input.read_bool()?;
    input.skip(2)?;
    let transform = engine_matrix44(&input.read_f32s::<16>()?);
    let position = input.read_vec3()?;
    let rotation = input.read_quat()?;
    let scale = input.read_vec3()?;
    let controller_ids = [input.read_i32()?, input.read_i32()?, input.read_i32()?];
    let property_len = input.read_count(1)?;
    let property = String::from_utf8_lossy(input.take(property_len)?).into_owned();

    input.check_count(num_children as i32, 4)?;
    let mut children = Vec::with_capacity(num_children);
    for _ in 0..num_children {
        if let Some(child) = linker.optional(input.read_i32()?, "child", Some(ChunkType::Node))? {
            children.push(child);
        }
    }

    Ok(NodeChunk {
        name,
        object,
        parent,
        material,
        is_group_head,
        is_group_member,
        transform,
        position,
        rotation,
        scale,
        controller_ids,
        property,
        children,
    })
}

fn decode_controller(input: &mut BinaryInput) -> Result<ControllerChunk> {
    let num_keys = input.read_count(0)?;
    let ctrl_id = input.read_u32()?;
    input.check_count(num_keys as i32, 32)?;
    let mut keys = Vec::with_capacity(num_keys);
    for _ in 0..num_keys {
        keys.push(ControllerKey {
            time: input.read_i32()?,
            position: input.read_vec3()?,
            rotation: input.read_quat()?,
        });
    }
    Ok(ControllerChunk { ctrl_id, keys })
}

fn decode_anim(input: &mut BinaryInput) -> Result<AnimChunk> {
    Ok(AnimChunk {
        num_keys: input.read_u32()?,
        initial_pos: input.read_vec3()?,
    })
}

fn decode_payload(
    chunk_type: ChunkType,
    version: u32,
    payload: &[u8],
    linker: &Linker,
) -> Result<ChunkData> {
    let input = &mut BinaryInput::new(payload);
    let data = match chunk_type {
        ChunkType::Mesh if version == 0x800 => {
            ChunkData::Mesh(MeshChunk::Streamed(decode_streamed_mesh(input, linker)?))
        }
        ChunkType::Mesh => ChunkData::Mesh(MeshChunk::Inline(decode_inline_mesh(input)?)),
        ChunkType::BoneAnim => ChunkData::BoneAnim(decode_bone_anim(input)?),
        ChunkType::BoneNameList => ChunkData::BoneNameList(decode_bone_name_list(input)?),
        ChunkType::Node => ChunkData::Node(decode_node(input, linker)?),
        ChunkType::Mtl => ChunkData::Mtl(decode_mtl(input, linker)?),
        ChunkType::Controller => ChunkData::Controller(decode_controller(input)?),
        ChunkType::Timing => ChunkData::Timing(decode_timing(input)?),
        ChunkType::BoneInitialPos => {
            ChunkData::BoneInitialPos(decode_bone_initial_pos(input, linker)?)
        }
        ChunkType::DataStream => ChunkData::DataStream(decode_data_stream(input)?),
        ChunkType::MeshSubsets => ChunkData::MeshSubsets(decode_mesh_subsets(input)?),
        ChunkType::Anim => ChunkData::Anim(decode_anim(input)?),
        ChunkType::Unknown(_) => ChunkData::Unknown(payload.to_vec()),
    };
    Ok(data)
}

/// Decode every chunk and resolve their references into a graph
pub fn read(bytes: &[u8]) -> Result<ChunkGraph> {
    let header = parse_header(bytes)?;
    let entries = read_table(bytes, &header)?;
    info!(
        "Container: {} ({:?}), format {:#x}, {} chunks",
        header.variant,
        header.file_type,
        header.format_version,
        entries.len()
    );

    let mut index: HashMap<u32, (usize, ChunkType)> = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let end = entry.offset as u64 + entry.size as u64;
        if end > bytes.len() as u64 {
            return Err(ImportError::format(format!(
                "chunk {:#x} payload {}..{} outside stream of {} bytes",
                entry.chunk_id,
                entry.offset,
                end,
                bytes.len()
            )));
        }
        if index
            .insert(entry.chunk_id, (i, ChunkType::from_u32(entry.type_id)))
            .is_some()
        {
            return Err(ImportError::format(format!(
                "duplicate chunk id {:#x}",
                entry.chunk_id
            )));
        }
    }

    let mut chunks = Vec::with_capacity(entries.len());
    for entry in &entries {
        let chunk_type = ChunkType::from_u32(entry.type_id);
        let start = entry.offset as usize;
        let payload = &bytes[start..start + entry.size as usize];
        debug!(
            "chunk {:#x}: {:?} v{:#x}, {} bytes at {}",
            entry.chunk_id, chunk_type, entry.version, entry.size, entry.offset
        );

        if let ChunkType::Unknown(raw) = chunk_type {
            warn!(
                "Unknown chunk type {:#010x} (id {:#x}), keeping raw bytes",
                raw, entry.chunk_id
            );
        } else if !chunk_type.supported_versions().contains(&entry.version) {
            return Err(ImportError::format(format!(
                "chunk {:#x}: unsupported {:?} version {:#x}",
                entry.chunk_id, chunk_type, entry.version
            )));
        }

        let linker = Linker {
            index: &index,
            owner: entry.chunk_id,
        };
        let data = decode_payload(chunk_type, entry.version, payload, &linker).map_err(|e| match e {
            ImportError::Format(msg) => ImportError::format(format!(
                "chunk {:#x} ({:?} v{:#x}): {}",
                entry.chunk_id, chunk_type, entry.version, msg
            )),
            other => other,
        })?;

        chunks.push(Chunk {
            chunk_id: entry.chunk_id,
            chunk_type,
            version: entry.version,
            data,
        });
    }

    Ok(ChunkGraph::new(header, chunks))
}
