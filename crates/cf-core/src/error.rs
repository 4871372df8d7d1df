use std::fmt;

use thiserror::Error;

use crate::model_types::{Resolution, VideoModel};

/// Form fields that carry an image URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlField {
    FirstFrame,
    LastFrame,
    Image,
}

impl UrlField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstFrame => "first_frame_url",
            Self::LastFrame => "last_frame_url",
            Self::Image => "img_url",
        }
    }
}

impl fmt::Display for UrlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local validation failures. None of these ever reach the network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("an API key is required")]
    MissingCredentials,

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("{0} is required for this model")]
    MissingUrl(UrlField),

    #[error("{field} is not a valid http(s) URL: {reason}")]
    InvalidUrl { field: UrlField, reason: String },

    #[error("{field} points at {host}, which does not serve files directly; use a publicly reachable image URL")]
    BlockedHost { field: UrlField, host: String },

    #[error("seed must be an integer, got '{0}'")]
    SeedNotNumeric(String),

    #[error("seed must be within 0..=2147483647, got {0}")]
    SeedOutOfRange(String),

    #[error("{model} does not support resolution {resolution}")]
    UnsupportedResolution { model: VideoModel, resolution: Resolution },

    #[error("request document does not match model {model}: {reason}")]
    DocumentMismatch { model: VideoModel, reason: String },
}
