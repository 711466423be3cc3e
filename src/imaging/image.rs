//! [`Image`]: one request's identity, engine and configuration.
//!
//! An `Image` is created once per request from source bytes, mutated in
//! place by [`transform`](Image::transform), read through
//! [`body`](Image::body) and [`content_type`](Image::content_type), and then
//! dropped. It is never shared between requests.

use super::accelerated::AcceleratedEngine;
use super::backend::{
    DecodeError, Dimensions, EncodeError, EngineKind, ImageEngine, TransformError,
};
use super::params::EncodeOptions;
use super::pipeline;
use super::quality::CustomQualityResult;
use super::software::SoftwareEngine;
use super::transformation::Transformation;
use crate::config::IiifConfig;
use crate::source::{Source, SourceError};
use thiserror::Error;
use tracing::info;

/// Failure creating an [`Image`].
#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub struct Image {
    identifier: String,
    source_identifier: String,
    engine: Box<dyn ImageEngine>,
    max_iterations: i64,
}

impl Image {
    /// Read `identifier` from `source` and decode it with the configured
    /// engine.
    pub fn new(
        config: &IiifConfig,
        source: &dyn Source,
        identifier: &str,
    ) -> Result<Self, ImageError> {
        let body = source.read(identifier)?;
        let image = Self::from_bytes(config, identifier, &body)?;
        info!(
            identifier,
            engine = %config.graphics.engine,
            format = %image.engine.format(),
            "loaded image"
        );
        Ok(image)
    }

    /// Decode `body` with the configured engine.
    pub fn from_bytes(
        config: &IiifConfig,
        identifier: &str,
        body: &[u8],
    ) -> Result<Self, DecodeError> {
        let engine = build_engine(config.graphics.engine, body, config.encode_options())?;
        Ok(Self::with_engine(
            identifier,
            engine,
            config.primitive.max_iterations,
        ))
    }

    /// Wrap an existing engine.
    pub fn with_engine(
        identifier: &str,
        engine: Box<dyn ImageEngine>,
        max_iterations: i64,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            source_identifier: identifier.to_string(),
            engine,
            max_iterations,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The identifier the image was loaded under, unaffected by
    /// [`rename`](Self::rename).
    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    pub fn rename(&mut self, identifier: &str) {
        self.identifier = identifier.to_string();
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Canonical format tag of the current payload (`jpg`, `png`, ...).
    pub fn format(&self) -> &'static str {
        self.engine.format().tag()
    }

    /// Content type of the current payload.
    pub fn content_type(&self) -> &'static str {
        self.engine.format().content_type()
    }

    pub fn dimensions(&self) -> Result<Dimensions, DecodeError> {
        self.engine.dimensions()
    }

    /// Replace the payload with freshly decoded `body`.
    pub fn update(&mut self, body: &[u8]) -> Result<(), DecodeError> {
        self.engine.update(body)
    }

    /// Encode the payload in its current format.
    pub fn body(&self) -> Result<Vec<u8>, EncodeError> {
        self.engine.encode()
    }

    /// Apply `transformation` in place.
    ///
    /// On error the image may be partially transformed and should be
    /// discarded.
    pub fn transform(
        &mut self,
        transformation: &Transformation,
    ) -> Result<CustomQualityResult, TransformError> {
        pipeline::transform(self.engine.as_mut(), transformation, self.max_iterations)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("identifier", &self.identifier)
            .field("engine", &self.engine.kind())
            .field("format", &self.engine.format())
            .finish()
    }
}

fn build_engine(
    kind: EngineKind,
    body: &[u8],
    options: EncodeOptions,
) -> Result<Box<dyn ImageEngine>, DecodeError> {
    Ok(match kind {
        EngineKind::Software => Box::new(SoftwareEngine::from_bytes(body, options)?),
        EngineKind::Accelerated => Box::new(AcceleratedEngine::from_bytes(body, options)?),
    })
}
