//! In-memory container writer for building synthetic assets in tests.

use byteorder::{LittleEndian, WriteBytesExt};

use super::reader::{
    FILE_TYPE_ANIMATION, FILE_TYPE_GEOMETRY, FORMAT_VERSION_744, FORMAT_VERSION_746, HEADER_SIZE,
    SIGNATURE_AION, SIGNATURE_CRYTEK,
};
use super::GameVariant;

#[derive(Default)]
pub(crate) struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.write_u32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.buf.write_i32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.write_f32::<LittleEndian>(v).unwrap();
        self
    }

    pub fn f32s(&mut self, values: &[f32]) -> &mut Self {
        for &v in values {
            self.f32(v);
        }
        self
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn fixed_str(&mut self, s: &str, len: usize) -> &mut Self {
        let mut raw = s.as_bytes().to_vec();
        raw.resize(len, 0);
        self.bytes(&raw)
    }

    pub fn cstr(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes()).u8(0)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

struct PendingChunk {
    type_id: u32,
    version: u32,
    chunk_id: u32,
    payload: Vec<u8>,
}

/// Lays out header, payloads, then the chunk table at the end
pub(crate) struct ContainerBuilder {
    signature: [u8; 8],
    file_type: u32,
    format_version: u32,
    chunks: Vec<PendingChunk>,
}

impl ContainerBuilder {
    pub fn new(variant: GameVariant) -> Self {
        let (signature, format_version) = match variant {
            GameVariant::FarCry => (*SIGNATURE_CRYTEK, FORMAT_VERSION_744),
            GameVariant::Crysis => (*SIGNATURE_CRYTEK, FORMAT_VERSION_746),
            GameVariant::Aion => (*SIGNATURE_AION, FORMAT_VERSION_744),
        };
        Self {
            signature,
            file_type: FILE_TYPE_GEOMETRY,
            format_version,
            chunks: Vec::new(),
        }
    }

    pub fn animation(mut self) -> Self {
        self.file_type = FILE_TYPE_ANIMATION;
        self
    }

    pub fn chunk(&mut self, type_id: u32, version: u32, chunk_id: u32, payload: Vec<u8>) -> &mut Self {
        self.chunks.push(PendingChunk {
            type_id,
            version,
            chunk_id,
            payload,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let payload_len: usize = self.chunks.iter().map(|c| c.payload.len()).sum();
        let table_offset = (HEADER_SIZE + payload_len) as u32;

        let mut out = PayloadWriter::new();
        out.bytes(&self.signature)
            .u32(self.file_type)
            .u32(self.format_version)
            .u32(table_offset);

        let mut offsets = Vec::with_capacity(self.chunks.len());
        let mut offset = HEADER_SIZE as u32;
        for chunk in &self.chunks {
            out.bytes(&chunk.payload);
            offsets.push(offset);
            offset += chunk.payload.len() as u32;
        }

        out.u32(self.chunks.len() as u32);
        for (chunk, offset) in self.chunks.iter().zip(offsets) {
            out.u32(chunk.type_id)
                .u32(chunk.version)
                .u32(offset)
                .u32(chunk.chunk_id);
            if self.format_version == FORMAT_VERSION_746 {
                out.u32(chunk.payload.len() as u32);
            }
        }
        out.finish()
    }
}

// ============================================================================
// Payload helpers
// ============================================================================

pub(crate) const IDENTITY_ROWS: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub(crate) fn bone_name_list(names: &[&str]) -> Vec<u8> {
    let raw: Vec<&[u8]> = names.iter().map(|n| n.as_bytes()).collect();
    bone_name_list_raw(&raw)
}

pub(crate) fn bone_name_list_raw(names: &[&[u8]]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(names.len() as u32);
    for name in names {
        w.bytes(name).u8(0);
    }
    w.finish()
}

/// Bone ids are the entry indices
pub(crate) fn bone_anim(parents: &[i32]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(parents.len() as u32);
    for (i, &parent) in parents.iter().enumerate() {
        let children = parents.iter().filter(|&&p| p == i as i32).count();
        w.i32(i as i32)
            .i32(parent)
            .u32(children as u32)
            .u32(0)
            .fixed_str("", 32);
    }
    w.finish()
}

pub(crate) fn bone_initial_pos(mesh_id: u32, bones: &[([[f32; 3]; 3], [f32; 3])]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(mesh_id).u32(bones.len() as u32);
    for (rows, pos) in bones {
        for row in rows {
            w.f32s(row);
        }
        w.f32s(pos);
    }
    w.finish()
}

#[derive(Default)]
pub(crate) struct MeshFixture {
    pub positions: Vec<[f32; 3]>,
    /// Corner indices, material id, smoothing group
    pub faces: Vec<([i32; 3], i32, i32)>,
    pub uvs: Vec<[f32; 2]>,
    pub uv_faces: Vec<[i32; 3]>,
    /// Per vertex `(bone, blending)`
    pub links: Option<Vec<Vec<(i32, f32)>>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

pub(crate) fn inline_mesh(mesh: &MeshFixture) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u8(mesh.links.is_some() as u8)
        .u8(mesh.colors.is_some() as u8)
        .u8(0)
        .u8(0)
        .i32(mesh.positions.len() as i32)
        .i32(mesh.uvs.len() as i32)
        .i32(mesh.faces.len() as i32)
        .i32(0);
    for p in &mesh.positions {
        w.f32s(p).f32s(&[0.0, 0.0, 1.0]);
    }
    for (corners, mat_id, sm_group) in &mesh.faces {
        w.i32(corners[0])
            .i32(corners[1])
            .i32(corners[2])
            .i32(*mat_id)
            .i32(*sm_group);
    }
    for uv in &mesh.uvs {
        w.f32s(uv);
    }
    if !mesh.uvs.is_empty() {
        for t in &mesh.uv_faces {
            w.i32(t[0]).i32(t[1]).i32(t[2]);
        }
    }
    if let Some(links) = &mesh.links {
        for vertex_links in links {
            w.u32(vertex_links.len() as u32);
            for &(bone, blending) in vertex_links {
                w.i32(bone).f32s(&[0.0, 0.0, 0.0]).f32(blending);
            }
        }
    }
    if let Some(colors) = &mesh.colors {
        for c in colors {
            w.bytes(c);
        }
    }
    w.finish()
}

/// `streams` pairs a stream kind with the chunk id holding it
pub(crate) fn streamed_mesh(
    num_vertices: i32,
    num_indices: i32,
    subsets_id: i32,
    streams: &[(usize, i32)],
) -> Vec<u8> {
    let mut ids = [0i32; 16];
    for &(kind, id) in streams {
        ids[kind] = id;
    }
    let mut w = PayloadWriter::new();
    w.i32(0)
        .i32(0)
        .i32(num_vertices)
        .i32(num_indices)
        .i32(1)
        .i32(subsets_id)
        .i32(0);
    for id in ids {
        w.i32(id);
    }
    w.f32s(&[-1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    w.finish()
}

pub(crate) fn data_stream(kind: u32, element_size: i32, num_elements: i32, data: &[u8]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.i32(0)
        .u32(kind)
        .i32(num_elements)
        .i32(element_size)
        .i32(0)
        .i32(0)
        .bytes(data);
    w.finish()
}

pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.f32s(values);
    w.finish()
}

/// `(first_index, num_indices, first_vertex, num_vertices, mat_id)`
pub(crate) fn mesh_subsets(subsets: &[(i32, i32, i32, i32, i32)]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(0).u32(subsets.len() as u32).i32(0).i32(0);
    for &(first_index, num_indices, first_vertex, num_vertices, mat_id) in subsets {
        w.i32(first_index)
            .i32(num_indices)
            .i32(first_vertex)
            .i32(num_vertices)
            .i32(mat_id)
            .f32(1.0)
            .f32s(&[0.0, 0.0, 0.0]);
    }
    w.finish()
}

pub(crate) struct MtlFixture<'a> {
    pub name: &'a str,
    /// 1 standard, 2 multi
    pub mtl_type: i32,
    pub flags: u32,
    pub opacity: f32,
    pub alpha_test: f32,
    pub diffuse_texture: Option<&'a str>,
    pub children: Vec<i32>,
}

impl Default for MtlFixture<'_> {
    fn default() -> Self {
        Self {
            name: "default",
            mtl_type: 1,
            flags: 0,
            opacity: 1.0,
            alpha_test: 0.0,
            diffuse_texture: None,
            children: Vec::new(),
        }
    }
}

pub(crate) fn mtl(m: &MtlFixture) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.fixed_str(m.name, 128)
        .i32(m.mtl_type)
        .u32(m.flags)
        .bytes(&[200, 200, 200])
        .bytes(&[255, 255, 255])
        .bytes(&[10, 10, 10])
        .u8(0)
        .f32(0.5)
        .f32(10.0)
        .f32(0.0)
        .f32(m.opacity)
        .f32(m.alpha_test);
    for slot in 0..11 {
        match (slot, m.diffuse_texture) {
            (1, Some(path)) => w.u8(1).bytes(&[0; 3]).fixed_str(path, 128),
            _ => w.u8(0).bytes(&[0; 3]).fixed_str("", 128),
        };
    }
    w.u32(m.children.len() as u32);
    for &child in &m.children {
        w.i32(child);
    }
    w.finish()
}

/// `transform` is row-major with the translation in the last row
pub(crate) fn node(name: &str, object_id: i32, material_id: i32, transform: [f32; 16]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.fixed_str(name, 64)
        .i32(object_id)
        .i32(-1)
        .u32(0)
        .i32(material_id)
        .u8(0)
        .u8(0)
        .bytes(&[0, 0])
        .f32s(&transform)
        .f32s(&transform[12..15])
        .f32s(&[0.0, 0.0, 0.0, 1.0])
        .f32s(&[1.0, 1.0, 1.0])
        .i32(-1)
        .i32(-1)
        .i32(-1)
        .u32(0);
    w.finish()
}

pub(crate) fn translation_rows(t: [f32; 3]) -> [f32; 16] {
    [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        t[0], t[1], t[2], 1.0,
    ]
}

pub(crate) fn timing(secs_per_tick: f32, ticks_per_frame: i32, start: i32, end: i32) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.f32(secs_per_tick)
        .i32(ticks_per_frame)
        .fixed_str("Default", 32)
        .i32(start)
        .i32(end)
        .u32(0);
    w.finish()
}

/// Keys are `(time, position, rotation xyzw)`
pub(crate) fn controller(ctrl_id: u32, keys: &[(i32, [f32; 3], [f32; 4])]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(keys.len() as u32).u32(ctrl_id);
    for (time, pos, rot) in keys {
        w.i32(*time).f32s(pos).f32s(rot);
    }
    w.finish()
}

pub(crate) fn anim(num_keys: u32, initial_pos: [f32; 3]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.u32(num_keys).f32s(&initial_pos);
    w.finish()
}
