//! Ranked format negotiation.
//!
//! Candidates are tried in order against the physical device's format
//! properties; the first one whose features cover the request wins. No match
//! is an unrecoverable initialization error.

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first candidate whose `tiling` features contain `features`.
///
/// `properties` looks up the device's format properties; production code
/// passes [`Device::format_properties`].
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] when no candidate qualifies.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    let found = candidates.iter().copied().find(|&format| {
        let props = properties(format);
        let available = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features,
            _ => props.optimal_tiling_features,
        };
        available.contains(features)
    });

    match found {
        Some(format) => {
            debug!("Selected format {:?} for {:?} ({:?})", format, features, tiling);
            Ok(format)
        }
        None => {
            error!("None of {:?} supports {:?} with {:?} tiling", candidates, features, tiling);
            Err(RhiError::NoSupportedFormat {
                candidates: candidates.to_vec(),
                features,
            })
        }
    }
}

/// Negotiates the depth attachment format for `device`.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| device.format_properties(format),
    )
}

/// Whether `format` carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Image aspect covered by views of `format`.
pub fn aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        f if has_stencil_component(f) => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(features: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_supported_candidate_wins() {
        let format = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| match format {
                vk::Format::D32_SFLOAT => vk::FormatProperties::default(),
                _ => optimal(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_tiling_selects_feature_set() {
        let linear_only = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::SAMPLED_IMAGE,
            ..Default::default()
        };
        let candidates = [vk::Format::R8G8B8A8_UNORM];
        assert!(
            find_supported_format(
                &candidates,
                vk::ImageTiling::LINEAR,
                vk::FormatFeatureFlags::SAMPLED_IMAGE,
                linear_only
            )
            .is_ok()
        );
        assert!(
            find_supported_format(
                &candidates,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::SAMPLED_IMAGE,
                linear_only
            )
            .is_err()
        );
    }

    #[test]
    fn test_no_match_is_error() {
        let result = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| optimal(vk::FormatFeatureFlags::SAMPLED_IMAGE),
        );
        match result {
            Err(RhiError::NoSupportedFormat { candidates, .. }) => {
                assert_eq!(candidates, DEPTH_FORMAT_CANDIDATES.to_vec());
            }
            other => panic!("expected NoSupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_aspect_flags() {
        assert_eq!(aspect_flags(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_flags(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_flags(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }
}
