//! Mesh assembly: positions, normals, UVs, colors, triangles and material
//! subsets merged into one face record per triangle.
//!
//! Face material indices point into the mesh's own `used_materials` list,
//! filled in first-seen order. Raw chunk material ids never reach consumers.

use log::{debug, warn};
use serde::Serialize;

use crate::chunk::{
    ChunkData, ChunkGraph, ChunkRef, InlineMesh, MeshChunk, StreamData, StreamKind, StreamedMesh,
    VertexRef,
};
use crate::error::{ImportError, Result};
use crate::material::Material;
use crate::math::{Mat4, Vec2, Vec3};

/// Smoothing group given to faces of streamed meshes, which carry none
const STREAMED_SMOOTHING_GROUP: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Face {
    pub vertices: [VertexRef; 3],
    /// Sentinels when the mesh has no usable UV triangles
    pub uvs: [VertexRef; 3],
    /// Index into `MeshGeometry::used_materials`
    pub material: Option<usize>,
    pub smooth: bool,
}

/// Interleaved per-corner vertex, ready for upload
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CornerVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshGeometry {
    pub name: String,
    /// Object transform from the owning node, identity for standalone meshes
    pub transform: Mat4,
    pub source: ChunkRef,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub colors: Option<Vec<[u8; 4]>>,
    pub faces: Vec<Face>,
    pub smoothing_groups: Vec<i32>,
    /// Material table indices in first-seen order
    pub used_materials: Vec<usize>,
    /// UV triangles were synthesized
    pub uv_placeholder: bool,
    /// Every used material is a nodraw surface
    pub hidden: bool,
}

impl MeshGeometry {
    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    /// Three corners per face. Missing normals and UVs read as zero.
    pub fn corner_vertices(&self) -> Vec<CornerVertex> {
        let mut corners = Vec::with_capacity(self.faces.len() * 3);
        for face in &self.faces {
            for (v, uv) in face.vertices.iter().zip(face.uvs) {
                let v = v.resolve();
                let position = self.positions.get(v).copied().unwrap_or(Vec3::ZERO);
                let normal = self.normals.get(v).copied().unwrap_or(Vec3::ZERO);
                let uv = self.uvs.get(uv.resolve()).copied().unwrap_or(Vec2::ZERO);
                corners.push(CornerVertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv: uv.to_array(),
                });
            }
        }
        corners
    }

    pub fn corner_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.corner_vertices()).to_vec()
    }
}

/// Raw per-face data shared by both mesh layouts before remapping
struct RawTriangles {
    vertices: Vec<[VertexRef; 3]>,
    uvs: Option<Vec<[VertexRef; 3]>>,
    material_ids: Vec<Option<i32>>,
    smoothing_groups: Vec<i32>,
}

struct MaterialRemap<'a> {
    table: &'a [(ChunkRef, Material)],
    used: Vec<usize>,
}

impl<'a> MaterialRemap<'a> {
    fn new(table: &'a [(ChunkRef, Material)]) -> Self {
        Self {
            table,
            used: Vec::new(),
        }
    }

    fn remap(&mut self, face: usize, mat_id: i32) -> Result<Option<usize>> {
        if mat_id < 0 {
            warn!("Face {} has negative material id {}", face, mat_id);
            return Ok(None);
        }
        let mat_id = mat_id as usize;
        if !self.table.is_empty() && mat_id >= self.table.len() {
            return Err(ImportError::reference(format!(
                "face {} uses material {} of {}",
                face,
                mat_id,
                self.table.len()
            )));
        }
        let index = match self.used.iter().position(|&m| m == mat_id) {
            Some(index) => index,
            None => {
                self.used.push(mat_id);
                self.used.len() - 1
            }
        };
        Ok(Some(index))
    }

    fn hidden(&self) -> bool {
        !self.used.is_empty()
            && self
                .used
                .iter()
                .all(|&m| self.table.get(m).is_some_and(|(_, mat)| mat.nodraw))
    }
}

fn check_refs(what: &str, face: usize, refs: &[VertexRef; 3], len: usize) -> Result<()> {
    match refs.iter().find(|r| r.resolve() >= len) {
        Some(bad) => Err(ImportError::reference(format!(
            "face {} {} index {:?} out of range ({} available)",
            face, what, bad, len
        ))),
        None => Ok(()),
    }
}

fn inline_triangles(mesh: &InlineMesh) -> RawTriangles {
    RawTriangles {
        vertices: mesh.faces.iter().map(|f| f.vertices).collect(),
        uvs: (!mesh.uv_faces.is_empty()).then(|| mesh.uv_faces.clone()),
        material_ids: mesh.faces.iter().map(|f| Some(f.mat_id)).collect(),
        smoothing_groups: mesh.faces.iter().map(|f| f.smoothing_group).collect(),
    }
}

fn stream_data<'g>(
    graph: &'g ChunkGraph,
    mesh: &StreamedMesh,
    kind: StreamKind,
) -> Option<&'g StreamData> {
    mesh.stream(kind)
        .and_then(|r| graph.data_stream(r))
        .map(|s| &s.data)
}

fn wrong_stream(kind: StreamKind) -> ImportError {
    ImportError::format(format!("{:?} slot holds a stream of another kind", kind))
}

struct StreamedParts {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    colors: Option<Vec<[u8; 4]>>,
    triangles: RawTriangles,
}

fn streamed_parts(graph: &ChunkGraph, mesh: &StreamedMesh) -> Result<StreamedParts> {
    let positions = match stream_data(graph, mesh, StreamKind::Positions) {
        Some(StreamData::Positions(p)) => p.clone(),
        Some(_) => return Err(wrong_stream(StreamKind::Positions)),
        None => return Err(ImportError::format("streamed mesh has no position stream")),
    };
    let indices = match stream_data(graph, mesh, StreamKind::Indices) {
        Some(StreamData::Indices(i)) => i,
        Some(_) => return Err(wrong_stream(StreamKind::Indices)),
        None => return Err(ImportError::format("streamed mesh has no index stream")),
    };
    if indices.len() % 3 != 0 {
        return Err(ImportError::format(format!(
            "index count {} is not a multiple of 3",
            indices.len()
        )));
    }

    let normals = match stream_data(graph, mesh, StreamKind::Normals) {
        Some(StreamData::Normals(n)) => n.clone(),
        Some(_) => return Err(wrong_stream(StreamKind::Normals)),
        None => Vec::new(),
    };
    let uvs = match stream_data(graph, mesh, StreamKind::Uvs) {
        Some(StreamData::Uvs(uv)) => uv.clone(),
        Some(_) => return Err(wrong_stream(StreamKind::Uvs)),
        None => Vec::new(),
    };
    let colors = match stream_data(graph, mesh, StreamKind::Colors) {
        Some(StreamData::Colors(c)) => Some(c.clone()),
        Some(_) => return Err(wrong_stream(StreamKind::Colors)),
        None => None,
    };

    let vertices: Vec<[VertexRef; 3]> = indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();

    let mut material_ids = vec![None; vertices.len()];
    if let Some(subsets) = mesh.subsets.and_then(|r| graph.mesh_subsets(r)) {
        for subset in &subsets.subsets {
            let first = subset.first_index as usize / 3;
            let last = (subset.first_index + subset.num_indices) as usize / 3;
            if last > vertices.len() {
                return Err(ImportError::reference(format!(
                    "subset covers faces {}..{} of {}",
                    first,
                    last,
                    vertices.len()
                )));
            }
            for id in &mut material_ids[first..last] {
                *id = Some(subset.mat_id);
            }
        }
    }

    let triangles = RawTriangles {
        uvs: (!uvs.is_empty()).then(|| vertices.clone()),
        smoothing_groups: vec![STREAMED_SMOOTHING_GROUP; vertices.len()],
        vertices,
        material_ids,
    };

    Ok(StreamedParts {
        positions,
        normals,
        uvs,
        colors,
        triangles,
    })
}

/// UV triangles when there is exactly one per face, otherwise `None` and the
/// caller falls back to sentinels.
fn usable_uv_triangles(
    name: &str,
    uv_faces: Option<Vec<[VertexRef; 3]>>,
    face_count: usize,
) -> Option<Vec<[VertexRef; 3]>> {
    match uv_faces {
        Some(uv_faces) if uv_faces.len() == face_count => Some(uv_faces),
        Some(uv_faces) => {
            warn!(
                "{}: {} UV triangles for {} faces, using placeholder",
                name,
                uv_faces.len(),
                face_count
            );
            None
        }
        None => {
            if face_count > 0 {
                debug!("{}: no UV triangles, using placeholder", name);
            }
            None
        }
    }
}

/// Assemble the mesh chunk `mesh` against the material table of its asset.
pub fn assemble_mesh(
    graph: &ChunkGraph,
    mesh: ChunkRef,
    materials: &[(ChunkRef, Material)],
) -> Result<MeshGeometry> {
    let chunk = graph.get(mesh);
    let name = format!("mesh_{:#x}", chunk.chunk_id);
    let (positions, normals, uvs, colors, triangles) = match &chunk.data {
        ChunkData::Mesh(MeshChunk::Inline(inline)) => (
            inline.positions.clone(),
            inline.normals.clone(),
            inline.uvs.clone(),
            inline
                .colors
                .as_ref()
                .map(|c| c.iter().map(|&[r, g, b]| [r, g, b, 255]).collect()),
            inline_triangles(inline),
        ),
        ChunkData::Mesh(MeshChunk::Streamed(streamed)) => {
            let parts = streamed_parts(graph, streamed)?;
            (
                parts.positions,
                parts.normals,
                parts.uvs,
                parts.colors,
                parts.triangles,
            )
        }
        _ => {
            return Err(ImportError::reference(format!(
                "chunk {:#x} is not a mesh",
                chunk.chunk_id
            )))
        }
    };

    let face_count = triangles.vertices.len();
    let uv_triangles = usable_uv_triangles(&name, triangles.uvs, face_count);
    let uv_placeholder = uv_triangles.is_none() && face_count > 0;

    let mut remap = MaterialRemap::new(materials);
    let mut faces = Vec::with_capacity(face_count);
    for (i, vertices) in triangles.vertices.iter().enumerate() {
        check_refs("vertex", i, vertices, positions.len())?;
        let uv = match &uv_triangles {
            Some(uv_faces) => {
                check_refs("uv", i, &uv_faces[i], uvs.len())?;
                uv_faces[i]
            }
            None => [VertexRef::Sentinel; 3],
        };
        let material = match triangles.material_ids[i] {
            Some(mat_id) => remap.remap(i, mat_id)?,
            None => None,
        };
        faces.push(Face {
            vertices: *vertices,
            uvs: uv,
            material,
            smooth: triangles.smoothing_groups[i] > 0,
        });
    }

    if let Some(colors) = &colors {
        if colors.len() != positions.len() {
            return Err(ImportError::format(format!(
                "{}: {} colors for {} vertices",
                name,
                colors.len(),
                positions.len()
            )));
        }
    }

    debug!(
        "{}: {} vertices, {} faces, {} materials used",
        name,
        positions.len(),
        faces.len(),
        remap.used.len()
    );

    Ok(MeshGeometry {
        name,
        transform: Mat4::IDENTITY,
        source: mesh,
        positions,
        normals,
        uvs,
        colors,
        faces,
        smoothing_groups: triangles.smoothing_groups,
        hidden: remap.hidden(),
        used_materials: remap.used,
        uv_placeholder,
    })
}

/// One geometry per node that instances a mesh, named and placed by the node.
/// Assets without mesh nodes yield every mesh chunk standalone.
pub fn assemble_meshes(
    graph: &ChunkGraph,
    materials: &[(ChunkRef, Material)],
) -> Result<Vec<MeshGeometry>> {
    let mut meshes = Vec::new();
    for (_, node) in graph.nodes() {
        let Some(object) = node.object.filter(|&r| graph.mesh(r).is_some()) else {
            continue;
        };
        let mut geometry = assemble_mesh(graph, object, materials)?;
        geometry.name = node.name.clone();
        geometry.transform = node.transform;
        meshes.push(geometry);
    }

    if meshes.is_empty() {
        for (r, chunk) in graph.iter() {
            if matches!(chunk.data, ChunkData::Mesh(_)) {
                meshes.push(assemble_mesh(graph, r, materials)?);
            }
        }
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::builder::{self, ContainerBuilder, MeshFixture, MtlFixture};
    use crate::chunk::{read, GameVariant};
    use crate::chunk::{CHUNK_DATA_STREAM, CHUNK_MESH, CHUNK_MESH_SUBSETS, CHUNK_MTL, CHUNK_NODE};
    use crate::material::material_table;

    fn quad() -> MeshFixture {
        MeshFixture {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            faces: vec![([0, 1, 2], 0, 1), ([0, 2, 3], 0, 1)],
            ..Default::default()
        }
    }

    fn single_mesh(mesh: &MeshFixture) -> (ChunkGraph, ChunkRef) {
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container.chunk(CHUNK_MESH, 0x744, 1, builder::inline_mesh(mesh));
        let graph = read(&container.build()).unwrap();
        let r = graph.ref_of(1).unwrap();
        (graph, r)
    }

    #[test]
    fn test_uv_placeholder_for_missing_uv_triangles() {
        let mesh = MeshFixture {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![([0, 1, 2], 0, 0)],
            ..Default::default()
        };
        let (graph, r) = single_mesh(&mesh);
        let geometry = assemble_mesh(&graph, r, &[]).unwrap();

        assert!(geometry.uv_placeholder);
        assert_eq!(geometry.faces.len(), 1);
        assert_eq!(geometry.faces[0].uvs, [VertexRef::Sentinel; 3]);
        assert!(geometry.faces[0].uvs.iter().all(|uv| uv.resolve() == 0));
    }

    #[test]
    fn test_uv_triangles_used_when_aligned() {
        let mut mesh = quad();
        mesh.uvs = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        mesh.uv_faces = vec![[0, 1, 2], [0, 2, 1]];
        let (graph, r) = single_mesh(&mesh);
        let geometry = assemble_mesh(&graph, r, &[]).unwrap();

        assert!(!geometry.uv_placeholder);
        assert_eq!(
            geometry.faces[1].uvs,
            [VertexRef::Index(0), VertexRef::Index(2), VertexRef::Index(1)]
        );
    }

    #[test]
    fn test_uv_count_mismatch_falls_back_to_placeholder() {
        let uv_faces = vec![[VertexRef::Index(0); 3]];
        assert!(usable_uv_triangles("m", Some(uv_faces.clone()), 2).is_none());
        assert_eq!(usable_uv_triangles("m", Some(uv_faces.clone()), 1), Some(uv_faces));
        assert!(usable_uv_triangles("m", None, 3).is_none());
    }

    #[test]
    fn test_sentinel_vertex_kept() {
        let mesh = MeshFixture {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![([-1, 1, 2], 0, 0)],
            ..Default::default()
        };
        let (graph, r) = single_mesh(&mesh);
        let geometry = assemble_mesh(&graph, r, &[]).unwrap();

        assert_eq!(geometry.faces[0].vertices[0], VertexRef::Sentinel);
        let corners = geometry.corner_vertices();
        assert_eq!(corners[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(corners[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vertex_out_of_range() {
        let mesh = MeshFixture {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0]],
            faces: vec![([0, 1, 2], 0, 0)],
            ..Default::default()
        };
        let (graph, r) = single_mesh(&mesh);
        let err = assemble_mesh(&graph, r, &[]).unwrap_err();
        assert!(matches!(err, ImportError::Reference(_)), "got {:?}", err);
    }

    #[test]
    fn test_material_remap_first_seen_order() {
        let mesh = MeshFixture {
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![
                ([0, 1, 2], 2, 0),
                ([0, 1, 2], 0, 1),
                ([0, 1, 2], 2, 1),
                ([0, 1, 2], -1, 1),
            ],
            ..Default::default()
        };
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container.chunk(CHUNK_MESH, 0x744, 1, builder::inline_mesh(&mesh));
        for (id, name) in [(2, "a(Phong)"), (3, "b(Phong)"), (4, "c(NoDraw)")] {
            container.chunk(
                CHUNK_MTL,
                0x746,
                id,
                builder::mtl(&MtlFixture {
                    name,
                    ..Default::default()
                }),
            );
        }
        let graph = read(&container.build()).unwrap();
        let table = material_table(&graph);
        let geometry = assemble_mesh(&graph, graph.ref_of(1).unwrap(), &table).unwrap();

        assert_eq!(geometry.used_materials, vec![2, 0]);
        let materials: Vec<_> = geometry.faces.iter().map(|f| f.material).collect();
        assert_eq!(materials, vec![Some(0), Some(1), Some(0), None]);
        let smooth: Vec<_> = geometry.faces.iter().map(|f| f.smooth).collect();
        assert_eq!(smooth, vec![false, true, true, true]);
        assert!(!geometry.hidden, "only one of the used materials is nodraw");
    }

    #[test]
    fn test_nodraw_only_mesh_hidden() {
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container
            .chunk(CHUNK_MESH, 0x744, 1, builder::inline_mesh(&quad()))
            .chunk(
                CHUNK_MTL,
                0x746,
                2,
                builder::mtl(&MtlFixture {
                    name: "collision(NoDraw)",
                    ..Default::default()
                }),
            );
        let graph = read(&container.build()).unwrap();
        let table = material_table(&graph);
        let geometry = assemble_mesh(&graph, graph.ref_of(1).unwrap(), &table).unwrap();
        assert!(geometry.hidden);
    }

    #[test]
    fn test_material_out_of_table() {
        let mut mesh = quad();
        mesh.faces[1].1 = 5;
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container
            .chunk(CHUNK_MESH, 0x744, 1, builder::inline_mesh(&mesh))
            .chunk(CHUNK_MTL, 0x746, 2, builder::mtl(&MtlFixture::default()));
        let graph = read(&container.build()).unwrap();
        let table = material_table(&graph);
        let err = assemble_mesh(&graph, graph.ref_of(1).unwrap(), &table).unwrap_err();
        assert!(matches!(err, ImportError::Reference(_)), "got {:?}", err);
    }

    #[test]
    fn test_colors_gain_alpha() {
        let mut mesh = quad();
        mesh.colors = Some(vec![[10, 20, 30]; 4]);
        let (graph, r) = single_mesh(&mesh);
        let geometry = assemble_mesh(&graph, r, &[]).unwrap();
        assert_eq!(geometry.colors.as_ref().unwrap()[0], [10, 20, 30, 255]);
    }

    #[test]
    fn test_streamed_mesh_with_subsets() {
        let positions = builder::f32_bytes(&[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
        ]);
        let mut indices = Vec::new();
        for i in [0u16, 1, 2, 0, 2, 3] {
            indices.extend_from_slice(&i.to_le_bytes());
        }
        let uvs = builder::f32_bytes(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);

        let mut container = ContainerBuilder::new(GameVariant::Crysis);
        container
            .chunk(CHUNK_DATA_STREAM, 0x800, 10, builder::data_stream(0, 12, 4, &positions))
            .chunk(CHUNK_DATA_STREAM, 0x800, 11, builder::data_stream(5, 2, 6, &indices))
            .chunk(CHUNK_DATA_STREAM, 0x800, 12, builder::data_stream(2, 8, 4, &uvs))
            .chunk(
                CHUNK_MESH_SUBSETS,
                0x800,
                13,
                builder::mesh_subsets(&[(0, 3, 0, 3, 1), (3, 3, 0, 4, 0)]),
            )
            .chunk(
                CHUNK_MESH,
                0x800,
                14,
                builder::streamed_mesh(4, 6, 13, &[(0, 10), (5, 11), (2, 12)]),
            );
        let graph = read(&container.build()).unwrap();
        let geometry = assemble_mesh(&graph, graph.ref_of(14).unwrap(), &[]).unwrap();

        assert_eq!(geometry.faces.len(), 2);
        assert!(!geometry.uv_placeholder);
        assert_eq!(geometry.faces[1].uvs, geometry.faces[1].vertices);
        assert_eq!(geometry.used_materials, vec![1, 0]);
        assert!(geometry.faces.iter().all(|f| f.smooth));
        assert!(geometry.normals.is_empty());
        assert_eq!(geometry.corner_bytes().len(), 6 * std::mem::size_of::<CornerVertex>());
    }

    #[test]
    fn test_streamed_mesh_requires_indices() {
        let positions = builder::f32_bytes(&[0.0; 9]);
        let mut container = ContainerBuilder::new(GameVariant::Crysis);
        container
            .chunk(CHUNK_DATA_STREAM, 0x800, 10, builder::data_stream(0, 12, 3, &positions))
            .chunk(CHUNK_MESH, 0x800, 11, builder::streamed_mesh(3, 0, 0, &[(0, 10)]));
        let graph = read(&container.build()).unwrap();
        let err = assemble_mesh(&graph, graph.ref_of(11).unwrap(), &[]).unwrap_err();
        assert!(matches!(err, ImportError::Format(_)), "got {:?}", err);
    }

    #[test]
    fn test_meshes_follow_nodes() {
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container
            .chunk(CHUNK_MESH, 0x744, 1, builder::inline_mesh(&quad()))
            .chunk(
                CHUNK_NODE,
                0x823,
                2,
                builder::node("door", 1, -1, builder::translation_rows([0.0, 0.0, 2.0])),
            );
        let graph = read(&container.build()).unwrap();
        let meshes = assemble_meshes(&graph, &[]).unwrap();

        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].name, "door");
        assert_eq!(meshes[0].transform.w_axis.z, 2.0);
    }

    #[test]
    fn test_standalone_mesh_without_nodes() {
        let (graph, _) = single_mesh(&quad());
        let meshes = assemble_meshes(&graph, &[]).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].name, "mesh_0x1");
        assert_eq!(meshes[0].transform, Mat4::IDENTITY);
    }
}
