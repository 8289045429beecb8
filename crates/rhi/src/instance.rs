//! Headless Vulkan instance.
//!
//! The frame ring never presents, so the instance enables no surface
//! extensions. Validation layers and a debug messenger are optional.
//!
//! # Example
//!
//! ```no_run
//! use framering_rhi::instance::Instance;
//!
//! let instance = Instance::new("framering", cfg!(debug_assertions))
//!     .expect("Failed to create Vulkan instance");
//! assert!(instance.api_version() >= ash::vk::API_VERSION_1_2);
//! ```

use std::ffi::{CStr, CString};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Timeline semaphores are core in Vulkan 1.2.
const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_2;

/// Vulkan instance wrapper.
///
/// Owns the loader entry, the instance and, when validation is active, the
/// debug messenger. Destroyed in reverse order on drop.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    api_version: u32,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Loads Vulkan and creates a headless instance.
    ///
    /// # Arguments
    ///
    /// * `application_name` - Reported to the driver
    /// * `enable_validation` - Request `VK_LAYER_KHRONOS_validation`; silently
    ///   skipped (with a warning) when the layer is not installed
    ///
    /// # Errors
    ///
    /// Returns an error if the loader cannot be found or instance creation fails.
    pub fn new(application_name: &str, enable_validation: bool) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let loader_version = unsafe { entry.try_enumerate_instance_version()? }
            .unwrap_or(vk::API_VERSION_1_0);
        if loader_version < REQUIRED_API_VERSION {
            warn!(
                "Vulkan loader reports {}.{}, timeline semaphores need 1.2",
                vk::api_version_major(loader_version),
                vk::api_version_minor(loader_version)
            );
            return Err(RhiError::NoSuitableGpu);
        }

        let validation = enable_validation && Self::has_validation_layer(&entry)?;
        if enable_validation && !validation {
            warn!("Validation layer requested but not available, proceeding without it");
        }

        let app_name = CString::new(application_name)
            .map_err(|e| RhiError::InvalidHandle(format!("application name: {e}")))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"framering")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(REQUIRED_API_VERSION);

        let extensions: Vec<*const std::ffi::c_char> = if validation {
            vec![ash::ext::debug_utils::NAME.as_ptr()]
        } else {
            Vec::new()
        };
        let layers: Vec<*const std::ffi::c_char> = if validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!("Headless Vulkan instance created (API 1.2)");

        let debug_utils = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::create_debug_messenger(&loader) {
                Ok(messenger) => {
                    debug!("Debug messenger created");
                    Some((loader, messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            api_version: REQUIRED_API_VERSION,
            debug_utils,
        })
    }

    /// Returns the instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the loader entry.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// API version the instance was created with.
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Whether validation layers are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_utils.is_some()
    }

    fn has_validation_layer(entry: &Entry) -> RhiResult<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(layers.iter().any(|layer| {
            layer.layer_name_as_c_str().ok() == Some(VALIDATION_LAYER_NAME)
        }))
    }

    fn create_debug_messenger(
        loader: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
            )
            .pfn_user_callback(Some(debug_callback));

        Ok(unsafe { loader.create_debug_utils_messenger(&create_info, None)? })
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }

    let data = unsafe { &*callback_data };
    let message = if data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(data.p_message).to_string_lossy() }
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "framering_rhi::validation", "{}", message);
    } else {
        warn!(target: "framering_rhi::validation", "{}", message);
    }

    vk::FALSE
}
