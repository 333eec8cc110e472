//! Pipeline cache persisted to disk between runs.
//!
//! Loading never fails: a missing, unreadable, or foreign blob produces an
//! empty cache and a warning. A blob is only handed to the driver when its
//! header matches the running device.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::pipeline_cache::PipelineCache;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let path = Path::new("pipeline_cache.bin");
//! let cache = PipelineCache::load(device, Some(path))?;
//! // ... build pipelines ...
//! cache.save(path)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiResult;

/// Size of a version-one pipeline cache header.
pub const CACHE_HEADER_SIZE: usize = 16 + vk::UUID_SIZE;

/// Why a persisted blob was not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRejection {
    TooShort(usize),
    HeaderLength(u32),
    Version(u32),
    Vendor { expected: u32, found: u32 },
    Device { expected: u32, found: u32 },
    Uuid,
}

impl std::fmt::Display for CacheRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "blob of {len} bytes is shorter than a header"),
            Self::HeaderLength(len) => write!(f, "header length {len} is invalid"),
            Self::Version(version) => write!(f, "unknown header version {version}"),
            Self::Vendor { expected, found } => {
                write!(f, "vendor {found:#x} does not match {expected:#x}")
            }
            Self::Device { expected, found } => {
                write!(f, "device {found:#x} does not match {expected:#x}")
            }
            Self::Uuid => write!(f, "cache UUID does not match the driver"),
        }
    }
}

fn read_u32(blob: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([blob[offset], blob[offset + 1], blob[offset + 2], blob[offset + 3]])
}

/// Checks a persisted blob against the running device.
pub fn validate_cache_header(
    blob: &[u8],
    properties: &vk::PhysicalDeviceProperties,
) -> Result<(), CacheRejection> {
    if blob.len() < CACHE_HEADER_SIZE {
        return Err(CacheRejection::TooShort(blob.len()));
    }

    let header_length = read_u32(blob, 0);
    if (header_length as usize) < CACHE_HEADER_SIZE || header_length as usize > blob.len() {
        return Err(CacheRejection::HeaderLength(header_length));
    }

    let version = read_u32(blob, 4);
    if version != vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32 {
        return Err(CacheRejection::Version(version));
    }

    let vendor = read_u32(blob, 8);
    if vendor != properties.vendor_id {
        return Err(CacheRejection::Vendor {
            expected: properties.vendor_id,
            found: vendor,
        });
    }

    let device = read_u32(blob, 12);
    if device != properties.device_id {
        return Err(CacheRejection::Device {
            expected: properties.device_id,
            found: device,
        });
    }

    if blob[16..CACHE_HEADER_SIZE] != properties.pipeline_cache_uuid {
        return Err(CacheRejection::Uuid);
    }

    Ok(())
}

/// Driver pipeline cache shared by every pipeline build.
pub struct PipelineCache {
    device: Arc<Device>,
    cache: vk::PipelineCache,
}

impl PipelineCache {
    /// Creates a cache seeded from `path` when it holds a compatible blob.
    ///
    /// # Errors
    ///
    /// Returns an error only if creating even an empty cache fails.
    pub fn load(device: Arc<Device>, path: Option<&Path>) -> RhiResult<Self> {
        let initial = path.and_then(|path| match std::fs::read(path) {
            Ok(blob) => match validate_cache_header(&blob, device.properties()) {
                Ok(()) => {
                    info!("Loaded pipeline cache from {} ({} bytes)", path.display(), blob.len());
                    Some(blob)
                }
                Err(reason) => {
                    warn!("Ignoring pipeline cache {}: {}", path.display(), reason);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No pipeline cache at {}, starting empty", path.display());
                None
            }
            Err(e) => {
                warn!("Failed to read pipeline cache {}: {}", path.display(), e);
                None
            }
        });

        let seeded = initial.as_deref().unwrap_or_default();
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(seeded);

        // SAFETY: the seed was validated against this device.
        let cache = match unsafe { device.handle().create_pipeline_cache(&create_info, None) } {
            Ok(cache) => cache,
            Err(e) if !seeded.is_empty() => {
                warn!("Driver rejected pipeline cache data ({:?}), starting empty", e);
                let empty = vk::PipelineCacheCreateInfo::default();
                // SAFETY: empty create info.
                unsafe { device.handle().create_pipeline_cache(&empty, None)? }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { device, cache })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }

    /// Writes the current cache contents to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver query or the file write fails.
    pub fn save(&self, path: &Path) -> RhiResult<()> {
        // SAFETY: the cache belongs to this device.
        let data = unsafe { self.device.handle().get_pipeline_cache_data(self.cache)? };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &data)?;

        info!("Saved pipeline cache to {} ({} bytes)", path.display(), data.len());
        Ok(())
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        // SAFETY: no pipeline creation is in progress.
        unsafe {
            self.device.handle().destroy_pipeline_cache(self.cache, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            vendor_id: 0x10de,
            device_id: 0x2684,
            pipeline_cache_uuid: [7; vk::UUID_SIZE],
            ..Default::default()
        }
    }

    fn header(vendor: u32, device: u32, uuid: [u8; vk::UUID_SIZE]) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&(CACHE_HEADER_SIZE as u32).to_le_bytes());
        blob.extend_from_slice(&1u32.to_le_bytes());
        blob.extend_from_slice(&vendor.to_le_bytes());
        blob.extend_from_slice(&device.to_le_bytes());
        blob.extend_from_slice(&uuid);
        blob.extend_from_slice(&[0xab; 64]);
        blob
    }

    #[test]
    fn test_matching_header_accepted() {
        let blob = header(0x10de, 0x2684, [7; vk::UUID_SIZE]);
        assert_eq!(validate_cache_header(&blob, &properties()), Ok(()));
    }

    #[test]
    fn test_short_blob_rejected() {
        assert_eq!(
            validate_cache_header(&[0; 8], &properties()),
            Err(CacheRejection::TooShort(8))
        );
    }

    #[test]
    fn test_foreign_device_rejected() {
        let blob = header(0x1002, 0x2684, [7; vk::UUID_SIZE]);
        assert!(matches!(
            validate_cache_header(&blob, &properties()),
            Err(CacheRejection::Vendor { found: 0x1002, .. })
        ));

        let blob = header(0x10de, 0x1111, [7; vk::UUID_SIZE]);
        assert!(matches!(
            validate_cache_header(&blob, &properties()),
            Err(CacheRejection::Device { .. })
        ));
    }

    #[test]
    fn test_stale_driver_rejected() {
        let blob = header(0x10de, 0x2684, [9; vk::UUID_SIZE]);
        assert_eq!(validate_cache_header(&blob, &properties()), Err(CacheRejection::Uuid));
    }

    #[test]
    fn test_bad_version_rejected() {
        let mut blob = header(0x10de, 0x2684, [7; vk::UUID_SIZE]);
        blob[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(validate_cache_header(&blob, &properties()), Err(CacheRejection::Version(2)));
    }
}
