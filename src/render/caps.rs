//! GPU capability record used by support checks

/// PCI vendor ids
const VENDOR_NVIDIA: u32 = 0x10DE;
const VENDOR_AMD: u32 = 0x1002;
const VENDOR_INTEL: u32 = 0x8086;
const VENDOR_QUALCOMM: u32 = 0x5143;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Qualcomm,
    #[default]
    Other,
}

impl GpuVendor {
    pub fn from_pci_id(id: u32) -> Self {
        match id {
            VENDOR_NVIDIA => Self::Nvidia,
            VENDOR_AMD => Self::Amd,
            VENDOR_INTEL => Self::Intel,
            VENDOR_QUALCOMM => Self::Qualcomm,
            _ => Self::Other,
        }
    }
}

/// What the host GPU can do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuCaps {
    pub vendor: GpuVendor,
    pub compute_shaders: bool,
    pub motion_vectors: bool,
    pub max_color_attachments: u32,
    /// Vendor upscaling runtimes are loaded by the host, not by this crate
    pub dlss_runtime: bool,
    pub xess_runtime: bool,
}

impl GpuCaps {
    /// Typical desktop GPU without vendor upscaling runtimes
    pub fn desktop(vendor: GpuVendor) -> Self {
        Self {
            vendor,
            compute_shaders: true,
            motion_vectors: true,
            max_color_attachments: 8,
            dlss_runtime: false,
            xess_runtime: false,
        }
    }

    /// Bare minimum device: no compute, no motion vectors
    pub fn minimal() -> Self {
        Self {
            vendor: GpuVendor::Other,
            compute_shaders: false,
            motion_vectors: false,
            max_color_attachments: 1,
            dlss_runtime: false,
            xess_runtime: false,
        }
    }

    /// Read capabilities from a wgpu adapter
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        let limits = adapter.limits();
        let compute_shaders = downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);

        let caps = Self {
            vendor: GpuVendor::from_pci_id(info.vendor),
            compute_shaders,
            // Motion vectors are written to a float color attachment by the host
            motion_vectors: limits.max_color_attachments >= 2,
            max_color_attachments: limits.max_color_attachments,
            dlss_runtime: false,
            xess_runtime: false,
        };
        log::info!(
            "GPU caps: {} ({:?}), compute={}, color attachments={}",
            info.name, caps.vendor, caps.compute_shaders, caps.max_color_attachments
        );
        caps
    }
}

impl Default for GpuCaps {
    fn default() -> Self {
        Self::desktop(GpuVendor::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_ids() {
        assert_eq!(GpuVendor::from_pci_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_pci_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_pci_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_pci_id(0x1234), GpuVendor::Other);
    }

    #[test]
    fn test_presets() {
        assert!(GpuCaps::desktop(GpuVendor::Amd).compute_shaders);
        assert!(!GpuCaps::minimal().compute_shaders);
        assert!(!GpuCaps::default().dlss_runtime);
    }
}
