//! Material records extracted from Mtl chunks.

use serde::Serialize;

use crate::chunk::{ChunkGraph, ChunkRef, MtlChunk, MtlType, TextureSlot};
use crate::math::Vec3;

/// Engine shader prefix dropped from shader names
const SHADER_PREFIX: &str = "AION_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlendMode {
    Opaque,
    Blend,
    Clip,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialTexture {
    pub slot: TextureSlot,
    /// Forward slashes, relative to the project root
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    pub name: String,
    /// Shader marks the surface as invisible
    pub nodraw: bool,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub ambient: Vec3,
    pub specular_level: f32,
    pub shininess: f32,
    pub self_illumination: f32,
    pub opacity: f32,
    pub alpha_test_threshold: f32,
    pub two_sided: bool,
    pub blend_mode: BlendMode,
    pub textures: Vec<MaterialTexture>,
}

fn color(rgb: [u8; 3]) -> Vec3 {
    Vec3::new(rgb[0] as f32, rgb[1] as f32, rgb[2] as f32) / 255.0
}

/// Lower-case everything except the `(shader)` part, which loses the engine
/// prefix and any spaces. Names without a closed shader part are unchanged.
pub fn normalize_material_name(raw: &str) -> String {
    let Some(begin) = raw.find('(') else {
        return raw.to_string();
    };
    let Some(end) = raw[begin..].find(')').map(|e| begin + e) else {
        return raw.to_string();
    };

    let shader = &raw[begin + 1..end];
    let shader = match shader.get(..SHADER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(SHADER_PREFIX) => &shader[SHADER_PREFIX.len()..],
        _ => shader,
    };
    let shader: String = shader.chars().filter(|&c| c != ' ').collect();

    format!(
        "{}({}{}",
        raw[..begin].to_lowercase(),
        shader,
        raw[end..].to_lowercase()
    )
}

pub fn is_nodraw(raw: &str) -> bool {
    raw.find('(')
        .and_then(|begin| raw.as_bytes().get(begin + 1..begin + 7))
        .is_some_and(|shader| shader.eq_ignore_ascii_case(b"nodraw"))
}

impl Material {
    pub fn from_chunk(chunk: &MtlChunk) -> Self {
        let blend_mode = if chunk.opacity < 1.0 {
            BlendMode::Blend
        } else if chunk.alpha_test > 0.0 && chunk.alpha_test < 1.0 {
            BlendMode::Clip
        } else {
            BlendMode::Opaque
        };

        let textures = TextureSlot::ALL
            .iter()
            .zip(&chunk.textures)
            .filter_map(|(&slot, texture)| {
                let texture = texture.as_ref()?;
                Some(MaterialTexture {
                    slot,
                    path: texture
                        .path
                        .replace('\\', "/")
                        .trim_start_matches('/')
                        .to_string(),
                })
            })
            .collect();

        Self {
            name: normalize_material_name(&chunk.name),
            nodraw: is_nodraw(&chunk.name),
            diffuse: color(chunk.diffuse),
            specular: color(chunk.specular),
            ambient: color(chunk.ambient),
            specular_level: chunk.spec_level,
            shininess: chunk.spec_shininess,
            self_illumination: chunk.self_illum,
            opacity: chunk.opacity,
            alpha_test_threshold: chunk.alpha_test,
            two_sided: chunk.flags & 1 != 0,
            blend_mode,
            textures,
        }
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&MaterialTexture> {
        self.textures.iter().find(|t| t.slot == slot)
    }
}

/// Materials face material ids index into: every non-multi Mtl chunk, in
/// chunk order.
pub fn material_table(graph: &ChunkGraph) -> Vec<(ChunkRef, Material)> {
    graph
        .materials()
        .filter(|(_, mtl)| mtl.mtl_type != MtlType::Multi)
        .map(|(r, mtl)| (r, Material::from_chunk(mtl)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::builder::{self, ContainerBuilder, MtlFixture};
    use crate::chunk::{read, GameVariant, CHUNK_MTL};

    #[test]
    fn test_name_normalization() {
        assert_eq!(
            normalize_material_name("Body_Skin(AION_Char Skin)/Extra"),
            "body_skin(CharSkin)/extra"
        );
        assert_eq!(normalize_material_name("Rock(aion_Stone)"), "rock(Stone)");
        assert_eq!(normalize_material_name("Metal(Phong Shader)"), "metal(PhongShader)");
    }

    #[test]
    fn test_name_without_shader_unchanged() {
        assert_eq!(normalize_material_name("Mixed_Case"), "Mixed_Case");
        assert_eq!(normalize_material_name("Open(Paren"), "Open(Paren");
    }

    #[test]
    fn test_nodraw_detection() {
        assert!(is_nodraw("collision(NoDraw)"));
        assert!(is_nodraw("x(nodraw_shadow)"));
        assert!(!is_nodraw("nodraw"));
        assert!(!is_nodraw("wall(Phong)"));
        assert!(!is_nodraw("short(no"));
    }

    #[test]
    fn test_material_modes_and_flags() {
        let mut container = ContainerBuilder::new(GameVariant::FarCry);
        container
            .chunk(
                CHUNK_MTL,
                0x746,
                1,
                builder::mtl(&MtlFixture {
                    name: "Glass(Glass)",
                    flags: 1,
                    opacity: 0.5,
                    diffuse_texture: Some("Objects\\props\\glass.dds"),
                    ..Default::default()
                }),
            )
            .chunk(
                CHUNK_MTL,
                0x746,
                2,
                builder::mtl(&MtlFixture {
                    name: "Leaves(Vegetation)",
                    alpha_test: 0.5,
                    ..Default::default()
                }),
            )
            .chunk(
                CHUNK_MTL,
                0x746,
                3,
                builder::mtl(&MtlFixture {
                    name: "multi",
                    mtl_type: 2,
                    children: vec![1, 2],
                    ..Default::default()
                }),
            );
        let graph = read(&container.build()).unwrap();
        let table = material_table(&graph);

        assert_eq!(table.len(), 2, "multi material is not part of the table");
        let glass = &table[0].1;
        assert_eq!(glass.blend_mode, BlendMode::Blend);
        assert!(glass.two_sided);
        assert_eq!(
            glass.texture(TextureSlot::Diffuse).map(|t| t.path.as_str()),
            Some("Objects/props/glass.dds")
        );
        assert!((glass.diffuse.x - 200.0 / 255.0).abs() < 1e-6);

        let leaves = &table[1].1;
        assert_eq!(leaves.blend_mode, BlendMode::Clip);
        assert!(!leaves.two_sided);
        assert!(leaves.textures.is_empty());
    }
}
