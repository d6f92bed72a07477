//! Configuration for decoding, transplanting and reflective resolution.

use std::{fmt, sync::Arc};

use crate::disassembler::ImageTokenResolver;

/// Inserts into a [`crate::utils::WeakCache`] between two sweeps of dead slots
pub const CACHE_SWEEP_INTERVAL: usize = 256;

/// Configuration of the instruction stream decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Retry tokens that do not resolve in the live module against the module's on-disk image.
    /// Needs an [`ImageTokenResolver`] and an assembly with a backing file.
    pub disk_fallback: bool,

    /// Reject local and argument operands outside the method's slots
    pub validate_operand_indices: bool,

    /// Largest instruction stream accepted, in bytes
    pub max_code_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            disk_fallback: false,
            validate_operand_indices: true,
            max_code_size: 0x00FF_FFFF,
        }
    }
}

impl DecoderConfig {
    /// Default checks, fallback to the on-disk image enabled
    #[must_use]
    pub fn with_disk_fallback() -> Self {
        Self {
            disk_fallback: true,
            ..Self::default()
        }
    }

    /// No operand index checks
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            validate_operand_indices: false,
            ..Self::default()
        }
    }
}

/// Configuration of a [`crate::transplant::MethodTransplanter`]
#[derive(Clone, Default)]
pub struct TransplantConfig {
    /// Decoder settings
    pub decoder: DecoderConfig,

    /// Prefix for the name of the holder type the transplanted method is placed in
    pub holder_type_prefix: String,

    /// Raw token lookup used when [`DecoderConfig::disk_fallback`] is set
    pub image_resolver: Option<Arc<dyn ImageTokenResolver>>,
}

impl TransplantConfig {
    /// All decoder checks, no fallback
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Enable the on-disk fallback through `resolver`
    #[must_use]
    pub fn with_disk_fallback(resolver: Arc<dyn ImageTokenResolver>) -> Self {
        Self {
            decoder: DecoderConfig::with_disk_fallback(),
            holder_type_prefix: String::new(),
            image_resolver: Some(resolver),
        }
    }
}

impl fmt::Debug for TransplantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransplantConfig")
            .field("decoder", &self.decoder)
            .field("holder_type_prefix", &self.holder_type_prefix)
            .field("image_resolver", &self.image_resolver.is_some())
            .finish()
    }
}

/// Configuration of a [`crate::reflect::LiveResolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Re-enumerate the domain's assemblies and retry once after a miss
    pub retry_on_miss: bool,

    /// Ask the domain's [`crate::live::AssemblyLoader`] for assemblies that are not loaded
    pub load_missing_assemblies: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry_on_miss: true,
            load_missing_assemblies: true,
        }
    }
}

impl ResolverConfig {
    /// Only consult already loaded assemblies
    #[must_use]
    pub fn offline() -> Self {
        Self {
            retry_on_miss: true,
            load_missing_assemblies: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert!(!DecoderConfig::default().disk_fallback);
        assert!(DecoderConfig::with_disk_fallback().disk_fallback);
        assert!(!DecoderConfig::lenient().validate_operand_indices);

        let strict = TransplantConfig::strict();
        assert!(strict.image_resolver.is_none());
        assert!(strict.decoder.validate_operand_indices);

        assert!(!ResolverConfig::offline().load_missing_assemblies);
        assert!(ResolverConfig::default().retry_on_miss);
    }
}
