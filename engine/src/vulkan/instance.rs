use anyhow::{anyhow, Result};
use log::*;
use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::c_void;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;
use vulkanalia::vk::ExtDebugUtilsExtension;
use vulkanalia::vk::KhrSurfaceExtension;
use vulkanalia::window as vk_window;
use vulkanalia::Entry;
use vulkanalia::Instance;
use winit::window::Window;

use super::constants;
use super::context::VulkanContext;

/// Layers and extensions the instance is created with.
#[derive(Clone, Debug, PartialEq)]
pub struct Capabilities {
    pub layers: Vec<vk::ExtensionName>,
    pub extensions: Vec<vk::ExtensionName>,
    pub debug_utils: bool,
}

/// Decides the instance layers and extensions from what the loader reports.
///
/// Fails if validation is requested and any requested layer is missing.
pub fn negotiate(
    validation: bool,
    available_layers: &HashSet<vk::ExtensionName>,
    requested_layers: &[vk::ExtensionName],
    window_extensions: &[vk::ExtensionName],
) -> Result<Capabilities> {
    let mut extensions = window_extensions.to_vec();

    if !validation {
        return Ok(Capabilities {
            layers: Vec::new(),
            extensions,
            debug_utils: false,
        });
    }

    if let Some(missing) = requested_layers
        .iter()
        .find(|l| !available_layers.contains(l))
    {
        return Err(anyhow!(
            "Validation layer `{}` requested but not supported.",
            missing
        ));
    }

    extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name);

    Ok(Capabilities {
        layers: requested_layers.to_vec(),
        extensions,
        debug_utils: true,
    })
}

#[derive(Debug)]
pub struct VulkanInstance {
    pub vk_instance: Instance,
    pub capabilities: Capabilities,
}

impl VulkanInstance {
    pub unsafe fn new(
        window: &Window,
        entry: &Entry,
        validation: bool,
        context: &mut VulkanContext,
    ) -> Result<VulkanInstance> {
        // Application Info
        let application_info = vk::ApplicationInfo::builder()
            .application_name(b"Model Viewer\0")
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(b"No Engine\0")
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 0, 0));

        // Layers / Extensions
        let available_layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();

        let window_extensions = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| **e)
            .collect::<Vec<_>>();

        let mut capabilities = negotiate(
            validation,
            &available_layers,
            &[constants::VALIDATION_LAYER],
            &window_extensions,
        )?;

        // Required by Vulkan SDK on macOS since 1.3.216.
        let flags = if cfg!(target_os = "macos")
            && entry.version()? >= constants::PORTABILITY_MACOS_VERSION
        {
            info!("Enabling extensions for macOS portability.");
            capabilities
                .extensions
                .push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name);
            capabilities
                .extensions
                .push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name);
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let layers = capabilities
            .layers
            .iter()
            .map(|l| l.as_ptr())
            .collect::<Vec<_>>();
        let extensions = capabilities
            .extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        // Create
        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .flags(flags);

        let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .user_callback(Some(debug_callback));

        if capabilities.debug_utils {
            info = info.push_next(&mut debug_info);
        }

        let instance = entry.create_instance(&info, None)?;

        // Messenger
        if capabilities.debug_utils {
            context.messenger = Some(instance.create_debug_utils_messenger_ext(&debug_info, None)?);
        }

        Ok(VulkanInstance {
            vk_instance: instance,
            capabilities,
        })
    }

    pub unsafe fn create_surface(
        &self,
        window: &Window,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.surface = vk_window::create_surface(&self.vk_instance, window, window)?;
        Ok(())
    }

    pub unsafe fn destroy(&mut self, context: &mut VulkanContext) {
        self.vk_instance.destroy_surface_khr(context.surface, None);
        if let Some(messenger) = context.messenger.take() {
            self.vk_instance
                .destroy_debug_utils_messenger_ext(messenger, None);
        }
        self.vk_instance.destroy_instance(None);
    }
}

/// Log level for a validation message, `None` for verbose chatter.
pub fn message_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Option<Level> {
    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        Some(Level::Error)
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        Some(Level::Warn)
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        Some(Level::Debug)
    } else {
        None
    }
}

extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    if let Some(level) = message_level(severity) {
        let data = unsafe { *data };
        let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();
        log!(level, "({:?}) {}", type_, message);
    }

    // Returning TRUE would abort the call that triggered the message.
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_EXTENSIONS: &[vk::ExtensionName] = &[
        vk::KHR_SURFACE_EXTENSION.name,
        vk::KHR_XCB_SURFACE_EXTENSION.name,
    ];

    fn layers(names: &[vk::ExtensionName]) -> HashSet<vk::ExtensionName> {
        names.iter().copied().collect()
    }

    #[test]
    fn release_mode_uses_window_extensions_only() {
        let requested = [constants::VALIDATION_LAYER];
        let available = HashSet::new();
        let capabilities = negotiate(false, &available, &requested, WINDOW_EXTENSIONS).unwrap();

        assert!(capabilities.layers.is_empty());
        assert_eq!(capabilities.extensions, WINDOW_EXTENSIONS.to_vec());
        assert!(!capabilities.debug_utils);
    }

    #[test]
    fn validation_adds_debug_utils_extension() {
        let available = layers(&[constants::VALIDATION_LAYER]);
        let requested = [constants::VALIDATION_LAYER];
        let capabilities = negotiate(true, &available, &requested, WINDOW_EXTENSIONS).unwrap();

        assert_eq!(capabilities.layers, vec![constants::VALIDATION_LAYER]);
        assert_eq!(
            capabilities.extensions.last(),
            Some(&vk::EXT_DEBUG_UTILS_EXTENSION.name)
        );
        assert!(capabilities.debug_utils);
    }

    #[test]
    fn missing_layer_is_fatal_only_with_validation() {
        let monitor = vk::ExtensionName::from_bytes(b"VK_LAYER_LUNARG_monitor");
        let available = layers(&[constants::VALIDATION_LAYER]);
        let requested = [constants::VALIDATION_LAYER, monitor];

        assert!(negotiate(true, &available, &requested, WINDOW_EXTENSIONS).is_err());
        assert!(negotiate(false, &available, &requested, WINDOW_EXTENSIONS).is_ok());
    }

    #[test]
    fn verbose_messages_are_dropped() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        assert_eq!(message_level(Severity::VERBOSE), None);
        assert_eq!(message_level(Severity::INFO), Some(Level::Debug));
        assert_eq!(message_level(Severity::WARNING), Some(Level::Warn));
        assert_eq!(message_level(Severity::ERROR), Some(Level::Error));
    }

    #[test]
    fn debug_sink_never_aborts_the_call() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        let text = b"vkCreateBuffer: size is zero\0";
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            message: text.as_ptr().cast(),
            ..Default::default()
        };

        for severity in [
            Severity::VERBOSE,
            Severity::INFO,
            Severity::WARNING,
            Severity::ERROR,
        ] {
            let handled = debug_callback(
                severity,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            );
            assert_eq!(handled, vk::FALSE);
        }
    }
}
