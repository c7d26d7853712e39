//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan 1.3 using the `ash`
//! crate. It handles:
//! - Instance, physical device and logical device creation
//! - Swapchain management
//! - Command buffer recording and blocking one-off submissions
//! - Buffer, image and sampler management through `gpu-allocator`
//! - Growable descriptor allocation and descriptor writes
//! - Pipeline creation for dynamic rendering
//! - Synchronization primitives and deferred deletion

mod error;

pub mod buffer;
pub mod command;
pub mod deletion_queue;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod immediate;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
