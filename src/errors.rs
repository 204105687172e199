//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`EngineError`] covers all failure modes including:
//! - RHI resource creation failures
//! - Asset loading and decoding errors
//! - Compositor graph deserialization errors
//! - Resource pool misuse (stale handles, duplicate registrations)
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, EngineError>`.
//!
//! Loader-level failures never cross the worker/main thread boundary as
//! errors; they are contained inside the streamer and communicated only
//! through the owning resource's loading state.

use thiserror::Error;

use crate::asset::AssetId;

/// The main error type for the engine core.
#[derive(Error, Debug)]
pub enum EngineError {
    // ========================================================================
    // RHI Errors
    // ========================================================================
    /// The backend rejected a texture description.
    #[error("Invalid texture description for '{label}': {reason}")]
    InvalidTextureDesc {
        /// Debug label of the offending texture
        label: String,
        /// Why the description was rejected
        reason: String,
    },

    /// The backend rejected a framebuffer description.
    #[error("Invalid framebuffer description: {0}")]
    InvalidFramebufferDesc(String),

    /// Pipeline creation failed (bad shader source, unsupported target).
    #[error("Pipeline creation failed for '{label}': {reason}")]
    PipelineCreateFailed {
        /// Debug label of the pipeline
        label: String,
        /// Backend-reported reason
        reason: String,
    },

    /// A command referenced a resource created by a different backend.
    #[error("Command references a foreign backend resource: {0}")]
    ForeignBackendResource(&'static str),

    // ========================================================================
    // Asset & Streaming Errors
    // ========================================================================
    /// The requested asset was not found by the asset provider.
    #[error("Asset not found: {0:?}")]
    AssetNotFound(AssetId),

    /// An asset id is already registered with the texture resource manager.
    #[error("Asset id already registered: {0:?}")]
    AssetAlreadyRegistered(AssetId),

    /// No loader is associated with the asset's filename extension.
    #[error("No texture loader for asset '{filename}'")]
    UnknownLoaderKind {
        /// Virtual filename the extension was taken from
        filename: String,
    },

    /// A resource handle no longer points at a live pool entry.
    #[error("Stale resource handle")]
    StaleHandle,

    /// The streamer has shut down and can no longer accept requests.
    #[error("Resource streamer is shut down")]
    StreamerShutDown,

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// Malformed texture container data.
    #[error("Texture decode error for {asset_id:?}: {reason}")]
    TextureDecode {
        /// Asset the bytes belonged to
        asset_id: AssetId,
        /// What the decoder rejected
        reason: String,
    },

    /// A texture format or layout the decoders do not support.
    #[error("Unsupported texture layout: {0}")]
    UnsupportedTextureLayout(String),

    /// Image crate decode failure (png/jpeg path).
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    // ========================================================================
    // Compositor Errors
    // ========================================================================
    /// The compositor wire format could not be parsed.
    #[error("Compositor graph deserialization error: {0}")]
    GraphDeserialization(String),

    /// A compositor pass referenced a texture resource that does not resolve.
    #[error("Compositor pass references unresolved texture {0:?}")]
    UnresolvedPassTexture(AssetId),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        EngineError::ImageDecode(err.to_string())
    }
}

/// Alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
