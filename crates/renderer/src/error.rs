//! Renderer error type.

use ember_resources::ResourceError;
use ember_rhi::RhiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] ember_core::Error),

    /// A required shader binary is missing from the shader directory.
    #[error("Shader not found: {0}")]
    ShaderNotFound(String),

    /// No material template is registered under the name, not even the
    /// default one.
    #[error("Material template not found: {0}")]
    TemplateNotFound(String),
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;

impl From<RendererError> for ember_core::Error {
    fn from(e: RendererError) -> Self {
        match e {
            RendererError::Core(inner) => inner,
            RendererError::Rhi(inner) => ember_core::Error::Vulkan(inner.to_string()),
            RendererError::Resource(inner) => ember_core::Error::Resource(inner.to_string()),
            RendererError::ShaderNotFound(name) => ember_core::Error::Shader(name),
            RendererError::TemplateNotFound(name) => ember_core::Error::Internal(format!(
                "material template '{}' not registered",
                name
            )),
        }
    }
}
