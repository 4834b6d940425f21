use std::collections::{BTreeSet, HashSet};

use anyhow::{anyhow, Result};
use log::*;
use thiserror::Error;
use vulkanalia::{
    vk::{self, DeviceV1_0, Handle, HasBuilder, InstanceV1_0, KhrSurfaceExtension},
    Device, Entry,
};

use super::{
    constants, context::VulkanContext, instance::VulkanInstance, swapchain::SwapchainSupport,
};

#[derive(Debug)]
pub struct VulkanDevice {
    pub vk_device: Device,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

/// Everything device selection looks at, gathered once per adapter.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
    pub queue_families: QueueFamilyIndices,
    pub extensions: HashSet<vk::ExtensionName>,
    pub swapchain_adequate: bool,
}

impl DeviceCandidate {
    unsafe fn describe(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let properties = instance
            .vk_instance
            .get_physical_device_properties(physical_device);
        let features = instance
            .vk_instance
            .get_physical_device_features(physical_device);

        let queue_properties = instance
            .vk_instance
            .get_physical_device_queue_family_properties(physical_device);
        let queue_families = QueueFamilyIndices::find(&queue_properties, |index| {
            Ok(instance.vk_instance.get_physical_device_surface_support_khr(
                physical_device,
                index,
                context.surface,
            )?)
        })?;

        let extensions = instance
            .vk_instance
            .enumerate_device_extension_properties(physical_device, None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let support = SwapchainSupport::get(instance, context.surface, physical_device)?;

        Ok(Self {
            name: properties.device_name.to_string(),
            device_type: properties.device_type,
            geometry_shader: features.geometry_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            queue_families,
            extensions,
            swapchain_adequate: support.is_adequate(),
        })
    }

    /// Checks the adapter against every requirement, in a fixed order.
    pub fn check(&self) -> Result<QueueFamilies, SuitabilityError> {
        if self.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
            && self.device_type != vk::PhysicalDeviceType::INTEGRATED_GPU
        {
            return Err(SuitabilityError("discrete or integrated GPU"));
        }

        if !self.geometry_shader {
            return Err(SuitabilityError("geometry shader support"));
        }

        let families = self
            .queue_families
            .complete()
            .ok_or(SuitabilityError("required queue families"))?;

        if !constants::DEVICE_EXTENSIONS
            .iter()
            .all(|e| self.extensions.contains(e))
        {
            return Err(SuitabilityError("required device extensions"));
        }

        if !self.swapchain_adequate {
            return Err(SuitabilityError("sufficient swapchain support"));
        }

        if !self.sampler_anisotropy {
            return Err(SuitabilityError("sampler anisotropy support"));
        }

        Ok(families)
    }
}

/// Returns the first acceptable candidate in enumeration order. Candidates
/// are described on demand, so adapters after the chosen one are never
/// queried. An adapter that cannot be described is skipped.
pub fn select_device<I>(candidates: I) -> Result<(usize, QueueFamilies)>
where
    I: IntoIterator<Item = Result<DeviceCandidate>>,
{
    let mut seen = 0;

    for (index, candidate) in candidates.into_iter().enumerate() {
        seen += 1;

        let candidate = match candidate {
            Ok(candidate) => candidate,
            Err(error) => {
                warn!("Skipping physical device {}: {:#}", index, error);
                continue;
            }
        };

        match candidate.check() {
            Ok(families) => {
                info!("Selected physical device (`{}`).", candidate.name);
                return Ok((index, families));
            }
            Err(error) => warn!(
                "Skipping physical device (`{}`): {}",
                candidate.name, error
            ),
        }
    }

    if seen == 0 {
        return Err(anyhow!("Failed to find a device with Vulkan support."));
    }

    Err(anyhow!("Failed to find suitable physical device."))
}

/// Picks the requested sample count when the device supports it, otherwise
/// the highest supported count below it.
pub fn resolve_sample_count(
    requested: u32,
    supported: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let wanted = vk::SampleCountFlags::from_bits_truncate(requested);
    if !wanted.is_empty() && supported.contains(wanted) {
        return wanted;
    }

    let fallback = [
        vk::SampleCountFlags::_64,
        vk::SampleCountFlags::_32,
        vk::SampleCountFlags::_16,
        vk::SampleCountFlags::_8,
        vk::SampleCountFlags::_4,
        vk::SampleCountFlags::_2,
    ]
    .into_iter()
    .find(|c| c.bits() <= requested && supported.contains(*c))
    .unwrap_or(vk::SampleCountFlags::_1);

    warn!(
        "Requested {} samples but the device only supports {:?}, using {:?}.",
        requested, supported, fallback
    );
    fallback
}

impl VulkanDevice {
    unsafe fn pick_physical_device(
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let physical_devices = instance.vk_instance.enumerate_physical_devices()?;

        let candidates = physical_devices
            .iter()
            .map(|d| DeviceCandidate::describe(instance, context, *d));

        let (index, families) = select_device(candidates)?;
        context.physical_device = physical_devices[index];
        context.queue_families = families;

        Ok(())
    }

    pub unsafe fn new(
        entry: &Entry,
        instance: &VulkanInstance,
        requested_samples: u32,
        context: &mut VulkanContext,
    ) -> Result<VulkanDevice> {
        VulkanDevice::pick_physical_device(instance, context)?;

        let limits = instance
            .vk_instance
            .get_physical_device_properties(context.physical_device)
            .limits;
        context.msaa_samples = resolve_sample_count(
            requested_samples,
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        );
        info!("Using {:?} MSAA samples.", context.msaa_samples);

        let queue_priorities = &[1.0];
        let queue_infos = context
            .queue_families
            .unique()
            .into_iter()
            .map(|i| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(i)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        // Device layers are deprecated but still honoured by pre-1.1 loaders.
        let layers = instance
            .capabilities
            .layers
            .iter()
            .map(|l| l.as_ptr())
            .collect::<Vec<_>>();

        let mut extensions = constants::DEVICE_EXTENSIONS
            .iter()
            .map(|n| n.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        if cfg!(target_os = "macos") && entry.version()? >= constants::PORTABILITY_MACOS_VERSION {
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .sample_rate_shading(true);

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(context.physical_device, &info, None)?;

        context.graphics_queue = device.get_device_queue(context.queue_families.graphics, 0);
        context.present_queue = device.get_device_queue(context.queue_families.present, 0);

        if context.graphics_queue.is_null() || context.present_queue.is_null() {
            device.destroy_device(None);
            return Err(anyhow!("Failed to retrieve device queues."));
        }

        Ok(VulkanDevice { vk_device: device })
    }

    pub unsafe fn destroy(&mut self) {
        self.vk_device.destroy_device(None);
    }
}

/// Queue families discovered on one adapter; usable only when both are found.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Takes the first graphics-capable family and the first family that can
    /// present to the surface.
    pub fn find<F>(
        properties: &[vk::QueueFamilyProperties],
        mut supports_present: F,
    ) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let graphics = properties
            .iter()
            .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        let mut present = None;
        for index in 0..properties.len() as u32 {
            if supports_present(index)? {
                present = Some(index);
                break;
            }
        }

        Ok(Self { graphics, present })
    }

    pub fn complete(&self) -> Option<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Some(QueueFamilies { graphics, present }),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, one queue-create-info each.
    pub fn unique(&self) -> Vec<u32> {
        [self.graphics, self.present]
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
