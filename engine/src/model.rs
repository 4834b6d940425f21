use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::mem::size_of;
use std::path::Path;

use anyhow::{anyhow, Result};
use cgmath::{vec2, vec3, Matrix4, Vector2, Vector3};
use log::*;
use vulkanalia::vk::{self, HasBuilder};

type Vec2 = Vector2<f32>;
type Vec3 = Vector3<f32>;
type Mat4 = Matrix4<f32>;

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(pos: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let pos = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0)
            .build();
        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(size_of::<Vec3>() as u32)
            .build();
        let tex_coord = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(2)
            .format(vk::Format::R32G32_SFLOAT)
            .offset((size_of::<Vec3>() + size_of::<Vec3>()) as u32)
            .build();
        [pos, color, tex_coord]
    }

    /// Bit patterns used for equality and hashing. `-0.0` is folded into
    /// `0.0` so the two compare and hash alike.
    fn key(&self) -> [u32; 8] {
        let bits = |v: f32| (v + 0.0).to_bits();
        [
            bits(self.pos[0]),
            bits(self.pos[1]),
            bits(self.pos[2]),
            bits(self.color[0]),
            bits(self.color[1]),
            bits(self.color[2]),
            bits(self.tex_coord[0]),
            bits(self.tex_coord[1]),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Per-image shader uniforms, matching `binding = 0` of the vertex shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

/// One triangle corner as handed over by the model loader.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Corner {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Placement applied to every corner on import: `(position + offset) * scale`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ImportTransform {
    pub offset: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for ImportTransform {
    fn default() -> Self {
        Self {
            offset: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// Deduplicated vertex and index arrays ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Builds a mesh from triangle corners, merging identical vertices in
    /// first-seen order.
    pub fn from_corners<I>(corners: I, transform: ImportTransform) -> Self
    where
        I: IntoIterator<Item = Corner>,
    {
        let mut mesh = Mesh::default();
        let mut unique_vertices = HashMap::new();

        for corner in corners {
            let [x, y, z] = corner.position;
            let [ox, oy, oz] = transform.offset;
            let [sx, sy, sz] = transform.scale;

            let vertex = Vertex::new(
                vec3((x + ox) * sx, (y + oy) * sy, (z + oz) * sz),
                vec3(1.0, 1.0, 1.0),
                vec2(corner.tex_coord[0], 1.0 - corner.tex_coord[1]),
            );

            if let Some(index) = unique_vertices.get(&vertex) {
                mesh.indices.push(*index);
            } else {
                let index = mesh.vertices.len() as u32;
                unique_vertices.insert(vertex, index);
                mesh.vertices.push(vertex);
                mesh.indices.push(index);
            }
        }

        mesh
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// Flattens loaded OBJ shapes into triangle corners.
fn corners(models: &[tobj::Model]) -> Result<Vec<Corner>> {
    let mut corners = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        if mesh.texcoords.is_empty() {
            return Err(anyhow!("Shape `{}` has no texture coordinates.", model.name));
        }

        for (i, index) in mesh.indices.iter().enumerate() {
            let pos_offset = (3 * index) as usize;
            let tex_index = mesh.texcoord_indices.get(i).unwrap_or(index);
            let tex_coord_offset = (2 * tex_index) as usize;

            corners.push(Corner {
                position: [
                    mesh.positions[pos_offset],
                    mesh.positions[pos_offset + 1],
                    mesh.positions[pos_offset + 2],
                ],
                tex_coord: [
                    mesh.texcoords[tex_coord_offset],
                    mesh.texcoords[tex_coord_offset + 1],
                ],
            });
        }
    }

    Ok(corners)
}

/// Loads an OBJ file into a deduplicated mesh.
pub fn load_model(path: &Path, transform: ImportTransform) -> Result<Mesh> {
    let (models, _) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            ..Default::default()
        },
    )
    .map_err(|e| anyhow!("Failed to load model `{}`: {}", path.display(), e))?;

    let mesh = Mesh::from_corners(corners(&models)?, transform);
    info!(
        "Loaded {} vertices and {} indices from `{}`.",
        mesh.vertices.len(),
        mesh.indices.len(),
        path.display()
    );

    Ok(mesh)
}

/// Decoded RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decodes an image file, forcing four channels.
    pub fn load(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| anyhow!("Failed to load texture `{}`: {}", path.display(), e))?
            .to_rgba8();
        let (width, height) = image.dimensions();

        Ok(Self {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    pub fn size(&self) -> u64 {
        self.pixels.len() as u64
    }

    pub fn mip_levels(&self) -> u32 {
        mip_levels(self.width, self.height)
    }
}

/// Number of mip levels down to 1x1: `floor(log2(max(w, h))) + 1`.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(position: [f32; 3], tex_coord: [f32; 2]) -> Corner {
        Corner {
            position,
            tex_coord,
        }
    }

    fn quad() -> Vec<Corner> {
        let a = corner([0.0, 0.0, 0.0], [0.0, 0.0]);
        let b = corner([1.0, 0.0, 0.0], [1.0, 0.0]);
        let c = corner([1.0, 1.0, 0.0], [1.0, 1.0]);
        let d = corner([0.0, 1.0, 0.0], [0.0, 1.0]);
        vec![a, b, c, c, d, a]
    }

    #[test]
    fn shared_corners_are_merged() {
        let mesh = Mesh::from_corners(quad(), ImportTransform::default());

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(mesh.index_count(), 6);
    }

    #[test]
    fn signed_zero_texture_coordinates_are_merged() {
        use std::collections::hash_map::DefaultHasher;

        let positive = Vertex::new(vec3(1.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0), vec2(0.0, 0.5));
        let negative = Vertex::new(vec3(1.0, 0.0, 0.0), vec3(1.0, 1.0, 1.0), vec2(-0.0, 0.5));

        let hash = |v: &Vertex| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(positive, negative);
        assert_eq!(hash(&positive), hash(&negative));

        let corners = vec![
            corner([1.0, 0.0, 0.0], [0.0, 0.5]),
            corner([1.0, 0.0, 0.0], [-0.0, 0.5]),
        ];
        let mesh = Mesh::from_corners(corners, ImportTransform::default());

        assert_eq!(mesh.vertices.len(), 1);
        assert_eq!(mesh.indices, vec![0, 0]);
    }

    #[test]
    fn same_position_with_different_uv_stays_distinct() {
        let corners = vec![
            corner([0.0, 0.0, 0.0], [0.0, 0.0]),
            corner([0.0, 0.0, 0.0], [0.5, 0.0]),
        ];
        let mesh = Mesh::from_corners(corners, ImportTransform::default());

        assert_eq!(mesh.vertices.len(), 2);
        assert_eq!(mesh.indices, vec![0, 1]);
    }

    #[test]
    fn import_is_order_stable_and_repeatable() {
        let transform = ImportTransform {
            offset: [1.0, -2.0, 0.5],
            scale: [2.0, 0.5, 3.0],
        };

        let first = Mesh::from_corners(quad(), transform);
        let second = Mesh::from_corners(quad(), transform);

        assert_eq!(first, second);
    }

    #[test]
    fn offset_is_applied_before_scale() {
        let transform = ImportTransform {
            offset: [1.0, 2.0, 3.0],
            scale: [2.0, 3.0, 4.0],
        };
        let mesh = Mesh::from_corners(vec![corner([1.0, 1.0, 1.0], [0.0, 0.0])], transform);

        assert_eq!(mesh.vertices[0].pos, vec3(4.0, 9.0, 16.0));
    }

    #[test]
    fn texture_v_is_flipped_and_color_is_white() {
        let mesh = Mesh::from_corners(
            vec![corner([0.0, 0.0, 0.0], [0.25, 0.25])],
            ImportTransform::default(),
        );

        assert_eq!(mesh.vertices[0].tex_coord, vec2(0.25, 0.75));
        assert_eq!(mesh.vertices[0].color, vec3(1.0, 1.0, 1.0));
    }

    #[test]
    fn obj_shapes_flatten_to_corners() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
            texcoords: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let models = vec![tobj::Model::new(mesh, "triangle".to_string())];

        let corners = corners(&models).unwrap();

        assert_eq!(corners.len(), 3);
        assert_eq!(corners[1], corner([1.0, 0.0, 0.0], [1.0, 0.0]));
    }

    #[test]
    fn obj_shape_without_uvs_is_rejected() {
        let mesh = tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0],
            indices: vec![0],
            ..Default::default()
        };
        let models = vec![tobj::Model::new(mesh, "bare".to_string())];

        assert!(corners(&models).is_err());
    }

    #[test]
    fn mip_levels_follow_the_larger_dimension() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(1024, 1024), 11);
        assert_eq!(mip_levels(1024, 512), 11);
        assert_eq!(mip_levels(300, 20), 9);
        assert_eq!(mip_levels(0, 0), 1);
    }

    #[test]
    fn vertex_layout_matches_struct() {
        let attributes = Vertex::attribute_descriptions();

        assert_eq!(Vertex::binding_description().stride, 32);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
    }
}
