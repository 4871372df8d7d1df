//! Canonical job specifications and the request builder.
//!
//! [`build`] turns raw form input into an immutable [`JobSpec`], the endpoint it
//! must be posted to, and the [`RequestDocument`] that goes over the wire and into
//! the history record. Nothing here performs I/O.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{UrlField, ValidationError};
use crate::model_types::{Endpoint, Mode, Resolution, VideoModel, VideoSize};

pub const MAX_SEED: u32 = 2_147_483_647;

/// Hosts that serve share pages instead of the file itself. The service cannot
/// download from them, so they are rejected before submission.
const BLOCKED_HOSTS: &[&str] = &[
    "drive.google.com",
    "docs.google.com",
    "dropbox.com",
    "onedrive.live.com",
    "1drv.ms",
];

/// Raw parameters as collected by a front end.
#[derive(Debug, Clone)]
pub struct JobForm {
    pub model: VideoModel,
    pub prompt: String,
    pub first_frame_url: Option<String>,
    pub last_frame_url: Option<String>,
    pub img_url: Option<String>,
    pub resolution: Option<Resolution>,
    pub size: Option<VideoSize>,
    pub prompt_extend: bool,
    /// Seed exactly as typed; blank means "let the service pick".
    pub seed: Option<String>,
}

impl JobForm {
    pub fn new(model: VideoModel, prompt: impl Into<String>) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            first_frame_url: None,
            last_frame_url: None,
            img_url: None,
            resolution: None,
            size: None,
            prompt_extend: true,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    DualFrame {
        prompt: String,
        first_frame_url: String,
        last_frame_url: String,
        resolution: Resolution,
        prompt_extend: bool,
        seed: Option<u32>,
    },
    TextOnly {
        prompt: String,
        size: VideoSize,
        prompt_extend: bool,
        seed: Option<u32>,
    },
    ImageConditioned {
        prompt: String,
        img_url: String,
        resolution: Resolution,
        prompt_extend: bool,
        seed: Option<u32>,
    },
}

impl JobSpec {
    pub fn model(&self) -> VideoModel {
        match self {
            Self::DualFrame { .. } => VideoModel::KeyframeToVideo,
            Self::TextOnly { .. } => VideoModel::TextToVideo,
            Self::ImageConditioned { .. } => VideoModel::ImageToVideo,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.model().endpoint()
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::DualFrame { prompt, .. }
            | Self::TextOnly { prompt, .. }
            | Self::ImageConditioned { prompt, .. } => prompt,
        }
    }

    pub fn seed(&self) -> Option<u32> {
        match self {
            Self::DualFrame { seed, .. }
            | Self::TextOnly { seed, .. }
            | Self::ImageConditioned { seed, .. } => *seed,
        }
    }

    pub fn to_document(&self) -> RequestDocument {
        let (input, parameters) = match self {
            Self::DualFrame {
                prompt,
                first_frame_url,
                last_frame_url,
                resolution,
                prompt_extend,
                seed,
            } => (
                RequestInput {
                    prompt: prompt.clone(),
                    first_frame_url: Some(first_frame_url.clone()),
                    last_frame_url: Some(last_frame_url.clone()),
                    img_url: None,
                },
                RequestParameters {
                    resolution: Some(*resolution),
                    size: None,
                    prompt_extend: *prompt_extend,
                    seed: *seed,
                },
            ),
            Self::TextOnly {
                prompt,
                size,
                prompt_extend,
                seed,
            } => (
                RequestInput {
                    prompt: prompt.clone(),
                    first_frame_url: None,
                    last_frame_url: None,
                    img_url: None,
                },
                RequestParameters {
                    resolution: None,
                    size: Some(*size),
                    prompt_extend: *prompt_extend,
                    seed: *seed,
                },
            ),
            Self::ImageConditioned {
                prompt,
                img_url,
                resolution,
                prompt_extend,
                seed,
            } => (
                RequestInput {
                    prompt: prompt.clone(),
                    first_frame_url: None,
                    last_frame_url: None,
                    img_url: Some(img_url.clone()),
                },
                RequestParameters {
                    resolution: Some(*resolution),
                    size: None,
                    prompt_extend: *prompt_extend,
                    seed: *seed,
                },
            ),
        };

        RequestDocument {
            model: self.model(),
            input,
            parameters,
        }
    }

    /// Rebuild a spec from a stored request document.
    pub fn from_document(doc: &RequestDocument) -> Result<Self, ValidationError> {
        let model = doc.model;
        let mismatch = |reason: &str| ValidationError::DocumentMismatch {
            model,
            reason: reason.to_string(),
        };
        let prompt = doc.input.prompt.clone();
        let prompt_extend = doc.parameters.prompt_extend;
        let seed = doc.parameters.seed;
        if let Some(value) = seed.filter(|s| *s > MAX_SEED) {
            return Err(ValidationError::SeedOutOfRange(value.to_string()));
        }

        match model.mode() {
            Mode::DualFrame => {
                if doc.input.img_url.is_some() {
                    return Err(mismatch("img_url is not used by this model"));
                }
                if doc.parameters.size.is_some() {
                    return Err(mismatch("size is not used by this model"));
                }
                let first_frame_url = doc
                    .input
                    .first_frame_url
                    .clone()
                    .ok_or_else(|| mismatch("first_frame_url is missing"))?;
                let last_frame_url = doc
                    .input
                    .last_frame_url
                    .clone()
                    .ok_or_else(|| mismatch("last_frame_url is missing"))?;
                Ok(Self::DualFrame {
                    prompt,
                    first_frame_url,
                    last_frame_url,
                    resolution: resolution_for(model, doc.parameters.resolution)?,
                    prompt_extend,
                    seed,
                })
            }
            Mode::TextOnly => {
                if doc.input.has_urls() {
                    return Err(mismatch("image URLs are not used by this model"));
                }
                if doc.parameters.resolution.is_some() {
                    return Err(mismatch("resolution is not used by this model"));
                }
                Ok(Self::TextOnly {
                    prompt,
                    size: doc.parameters.size.unwrap_or_default(),
                    prompt_extend,
                    seed,
                })
            }
            Mode::ImageConditioned => {
                if doc.input.first_frame_url.is_some() || doc.input.last_frame_url.is_some() {
                    return Err(mismatch("frame URLs are not used by this model"));
                }
                if doc.parameters.size.is_some() {
                    return Err(mismatch("size is not used by this model"));
                }
                let img_url = doc
                    .input
                    .img_url
                    .clone()
                    .ok_or_else(|| mismatch("img_url is missing"))?;
                Ok(Self::ImageConditioned {
                    prompt,
                    img_url,
                    resolution: resolution_for(model, doc.parameters.resolution)?,
                    prompt_extend,
                    seed,
                })
            }
        }
    }
}

/// Request body, `{model, input, parameters}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDocument {
    pub model: VideoModel,
    pub input: RequestInput,
    pub parameters: RequestParameters,
}

impl RequestDocument {
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInput {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

impl RequestInput {
    fn has_urls(&self) -> bool {
        self.first_frame_url.is_some() || self.last_frame_url.is_some() || self.img_url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<VideoSize>,
    #[serde(default = "prompt_extend_default")]
    pub prompt_extend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

fn prompt_extend_default() -> bool {
    true
}

/// Output of [`build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRequest {
    pub spec: JobSpec,
    pub endpoint: Endpoint,
    pub document: RequestDocument,
}

/// Validate a form and turn it into a canonical spec.
pub fn build(form: &JobForm) -> Result<BuiltRequest, ValidationError> {
    let prompt = form.prompt.trim();
    if prompt.is_empty() {
        return Err(ValidationError::EmptyPrompt);
    }
    let prompt = prompt.to_string();
    let seed = parse_seed(form.seed.as_deref())?;
    let prompt_extend = form.prompt_extend;

    let spec = match form.model.mode() {
        Mode::DualFrame => JobSpec::DualFrame {
            first_frame_url: direct_url(UrlField::FirstFrame, form.first_frame_url.as_deref())?,
            last_frame_url: direct_url(UrlField::LastFrame, form.last_frame_url.as_deref())?,
            resolution: resolution_for(form.model, form.resolution)?,
            prompt,
            prompt_extend,
            seed,
        },
        Mode::TextOnly => JobSpec::TextOnly {
            size: form.size.unwrap_or_default(),
            prompt,
            prompt_extend,
            seed,
        },
        Mode::ImageConditioned => JobSpec::ImageConditioned {
            img_url: direct_url(UrlField::Image, form.img_url.as_deref())?,
            resolution: resolution_for(form.model, form.resolution)?,
            prompt,
            prompt_extend,
            seed,
        },
    };

    Ok(BuiltRequest {
        endpoint: spec.endpoint(),
        document: spec.to_document(),
        spec,
    })
}

fn parse_seed(raw: Option<&str>) -> Result<Option<u32>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValidationError::SeedNotNumeric(raw.to_string()));
    }

    match raw.parse::<i64>() {
        Ok(value) if (0..=i64::from(MAX_SEED)).contains(&value) => Ok(Some(value as u32)),
        _ => Err(ValidationError::SeedOutOfRange(raw.to_string())),
    }
}

fn resolution_for(
    model: VideoModel,
    requested: Option<Resolution>,
) -> Result<Resolution, ValidationError> {
    let resolution = requested.unwrap_or_default();
    if model.supported_resolutions().contains(&resolution) {
        Ok(resolution)
    } else {
        Err(ValidationError::UnsupportedResolution { model, resolution })
    }
}

fn direct_url(field: UrlField, raw: Option<&str>) -> Result<String, ValidationError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(ValidationError::MissingUrl(field));
    }

    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl {
            field,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if is_blocked_host(&host) {
        return Err(ValidationError::BlockedHost { field, host });
    }

    Ok(raw.to_string())
}

fn is_blocked_host(host: &str) -> bool {
    BLOCKED_HOSTS.iter().any(|blocked| {
        host == *blocked
            || host
                .strip_suffix(blocked)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
