//! Extension-pair image conversion.
//!
//! A lookup for `page.webp.png` where only `page.webp` exists is served by
//! decoding the WebP entry and re-encoding it as PNG. The registry maps
//! extensions to decoders and (separately) to encoders; it is populated once
//! at startup and only read afterwards.
//!
//! Extensions are normalized before use: the leading dot is optional and
//! matching is case-insensitive, so `.PNG`, `png` and `.png` are one key.

mod codecs;

pub use codecs::{FormatCodec, ImageDecoder, ImageEncoder, builtin_codec};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::vfs::{VfsError, VfsResult};

/// Decoders registered by [`ConversionRegistry::with_defaults`].
pub const DEFAULT_DECODERS: &[&str] = &["webp", "png"];
/// Encoders registered by [`ConversionRegistry::with_defaults`].
pub const DEFAULT_ENCODERS: &[&str] = &["png"];

/// Normalize an extension: strip one leading dot and lowercase.
pub fn normalize_ext(ext: &str) -> String {
    ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase()
}

/// Split `name` at its last dot into `(stem, extension)`.
///
/// Returns `None` when there is no dot or the extension is empty.
fn split_ext(name: &str) -> Option<(&str, &str)> {
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    if ext.is_empty() {
        return None;
    }
    Some((&name[..dot], ext))
}

/// Extension → decoder and extension → encoder tables.
#[derive(Default)]
pub struct ConversionRegistry {
    decoders: HashMap<String, Arc<dyn ImageDecoder>>,
    encoders: HashMap<String, Arc<dyn ImageEncoder>>,
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut decoders: Vec<_> = self.decoders.keys().collect();
        let mut encoders: Vec<_> = self.encoders.keys().collect();
        decoders.sort();
        encoders.sort();
        f.debug_struct("ConversionRegistry")
            .field("decoders", &decoders)
            .field("encoders", &encoders)
            .finish()
    }
}

impl ConversionRegistry {
    /// Create a registry with no codecs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry decoding WebP and PNG and encoding PNG.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for ext in DEFAULT_DECODERS {
            if let Some(codec) = builtin_codec(ext) {
                registry.register_decoder(ext, Arc::new(codec));
            }
        }
        for ext in DEFAULT_ENCODERS {
            if let Some(codec) = builtin_codec(ext) {
                registry.register_encoder(ext, Arc::new(codec));
            }
        }
        registry
    }

    /// Register a decoder for `ext`, replacing any previous one.
    pub fn register_decoder(&mut self, ext: &str, decoder: Arc<dyn ImageDecoder>) {
        self.decoders.insert(normalize_ext(ext), decoder);
    }

    /// Register an encoder for `ext`, replacing any previous one.
    pub fn register_encoder(&mut self, ext: &str, encoder: Arc<dyn ImageEncoder>) {
        self.encoders.insert(normalize_ext(ext), encoder);
    }

    /// Register the built-in decoder for `ext`.
    pub fn register_builtin_decoder(&mut self, ext: &str) -> VfsResult<()> {
        let codec = builtin_codec(&normalize_ext(ext))
            .ok_or_else(|| VfsError::other(format!("no built-in decoder for {ext}")))?;
        self.register_decoder(ext, Arc::new(codec));
        Ok(())
    }

    /// Register the built-in encoder for `ext`.
    pub fn register_builtin_encoder(&mut self, ext: &str) -> VfsResult<()> {
        let codec = builtin_codec(&normalize_ext(ext))
            .ok_or_else(|| VfsError::other(format!("no built-in encoder for {ext}")))?;
        self.register_encoder(ext, Arc::new(codec));
        Ok(())
    }

    /// Returns true if a decoder is registered for `ext`.
    pub fn has_decoder(&self, ext: &str) -> bool {
        self.decoders.contains_key(&normalize_ext(ext))
    }

    /// Returns true if an encoder is registered for `ext`.
    pub fn has_encoder(&self, ext: &str) -> bool {
        self.encoders.contains_key(&normalize_ext(ext))
    }

    /// Detect a dual-extension name (`base.src.dst`).
    ///
    /// On a match returns `base.src` (the name to look up) and a converter
    /// bound to `(src, dst)`. No match when either extension is missing, `src`
    /// has no decoder or `dst` has no encoder. `src == dst` is a match; the
    /// converter then passes bytes through untouched.
    pub fn detect(self: &Arc<Self>, name: &str) -> Option<(String, Converter)> {
        let (source, dst) = split_ext(name)?;
        let (_, src) = split_ext(source)?;

        if !self.has_decoder(src) || !self.has_encoder(dst) {
            return None;
        }

        let converter = Converter {
            registry: Arc::clone(self),
            src_ext: normalize_ext(src),
            dst_ext: normalize_ext(dst),
        };
        Some((source.to_owned(), converter))
    }

    /// Re-encode `bytes` from `src_ext` to `dst_ext`.
    ///
    /// Equal extensions return the input untouched, without a decode/encode
    /// round trip.
    pub fn convert(&self, bytes: Vec<u8>, src_ext: &str, dst_ext: &str) -> VfsResult<Vec<u8>> {
        let src = normalize_ext(src_ext);
        let dst = normalize_ext(dst_ext);
        if src == dst {
            return Ok(bytes);
        }

        let (Some(decoder), Some(encoder)) = (self.decoders.get(&src), self.encoders.get(&dst))
        else {
            return Err(VfsError::UnsupportedConversion { from: src, to: dst });
        };

        let image = decoder.decode(&bytes).map_err(|e| VfsError::Decode {
            ext: src.clone(),
            reason: e.to_string(),
        })?;

        let mut out = Vec::new();
        encoder.encode(&image, &mut out).map_err(|e| VfsError::Encode {
            ext: dst.clone(),
            reason: e.to_string(),
        })?;
        Ok(out)
    }
}

/// One-shot converter bound to a `(src, dst)` extension pair.
#[derive(Clone)]
pub struct Converter {
    registry: Arc<ConversionRegistry>,
    src_ext: String,
    dst_ext: String,
}

impl Converter {
    /// Source extension (normalized).
    pub fn src_ext(&self) -> &str {
        &self.src_ext
    }

    /// Destination extension (normalized).
    pub fn dst_ext(&self) -> &str {
        &self.dst_ext
    }

    /// Convert `bytes` from the source to the destination format.
    pub fn convert(&self, bytes: Vec<u8>) -> VfsResult<Vec<u8>> {
        self.registry.convert(bytes, &self.src_ext, &self.dst_ext)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter<.{}, .{}>", self.src_ext, self.dst_ext)
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{} -> .{}", self.src_ext, self.dst_ext)
    }
}
