//! Vertex layouts of the two G-buffer pipelines.
//!
//! | location | static     | skinned          |
//! |----------|------------|------------------|
//! | 0        | position   | position         |
//! | 1        | uv         | uv               |
//! | 2        | normal     | normal           |
//! | 3        |            | bone indices     |
//! | 4        |            | bone weights     |

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{IVec4, Vec2, Vec3, Vec4};

/// Vertex of a rigid mesh. 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StaticVertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
}

impl StaticVertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        binding::<Self>()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
        ]
    }
}

/// Vertex of a skinned mesh: up to four bone influences. 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub uv: Vec2,
    pub normal: Vec3,
    pub bones: IVec4,
    pub weights: Vec4,
}

impl SkinnedVertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        binding::<Self>()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32B32A32_SINT, offset_of!(Self, bones)),
            attribute(4, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, weights)),
        ]
    }
}

fn binding<T>() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<T>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_vertex_layout() {
        assert_eq!(size_of::<StaticVertex>(), 32);
        let binding = StaticVertex::binding_description();
        assert_eq!(binding.stride, 32);

        let attrs = StaticVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 20);
    }

    #[test]
    fn test_skinned_vertex_layout() {
        assert_eq!(size_of::<SkinnedVertex>(), 64);
        let attrs = SkinnedVertex::attribute_descriptions();
        assert_eq!(attrs[3].location, 3);
        assert_eq!(attrs[3].format, vk::Format::R32G32B32A32_SINT);
        assert_eq!(attrs[3].offset, 32);
        assert_eq!(attrs[4].offset, 48);
    }

    #[test]
    fn test_skinned_prefix_matches_static() {
        let rigid = StaticVertex::attribute_descriptions();
        let skinned = SkinnedVertex::attribute_descriptions();
        for (a, b) in rigid.iter().zip(skinned.iter()) {
            assert_eq!(a.location, b.location);
            assert_eq!(a.format, b.format);
            assert_eq!(a.offset, b.offset);
        }
    }
}
