use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Video synthesis models offered by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoModel {
    KeyframeToVideo,
    TextToVideo,
    ImageToVideo,
}

impl VideoModel {
    /// Model ID for API communication
    pub fn id(&self) -> &'static str {
        match self {
            Self::KeyframeToVideo => "wanx2.1-kf2v-plus",
            Self::TextToVideo => "wanx2.1-t2v-turbo",
            Self::ImageToVideo => "wanx2.1-i2v-turbo",
        }
    }

    /// Model name for display
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyframeToVideo => "First/last frame",
            Self::TextToVideo => "Text to video",
            Self::ImageToVideo => "Single image",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::KeyframeToVideo => {
                "Generates the transition between a first and a last frame, guided by the prompt"
            }
            Self::TextToVideo => "Generates a clip from the prompt alone; fastest of the three",
            Self::ImageToVideo => "Animates a single still image, guided by the prompt",
        }
    }

    /// Estimated generation time in seconds
    pub fn estimated_time_secs(&self) -> u32 {
        match self {
            Self::KeyframeToVideo => 600,
            Self::TextToVideo => 300,
            Self::ImageToVideo => 420,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::KeyframeToVideo => Mode::DualFrame,
            Self::TextToVideo => Mode::TextOnly,
            Self::ImageToVideo => Mode::ImageConditioned,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.mode().endpoint()
    }

    /// Resolutions accepted by the model. Text-to-video takes a [`VideoSize`] instead.
    pub fn supported_resolutions(&self) -> &'static [Resolution] {
        match self {
            Self::KeyframeToVideo => &[Resolution::P720],
            Self::TextToVideo => &[],
            Self::ImageToVideo => &[Resolution::P480, Resolution::P720],
        }
    }

    /// All available models
    pub fn all() -> [VideoModel; 3] {
        [Self::KeyframeToVideo, Self::TextToVideo, Self::ImageToVideo]
    }
}

impl Default for VideoModel {
    fn default() -> Self {
        Self::KeyframeToVideo
    }
}

impl fmt::Display for VideoModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model id '{0}'")]
pub struct UnknownModel(pub String);

impl FromStr for VideoModel {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::all()
            .into_iter()
            .find(|model| model.id() == trimmed)
            .ok_or_else(|| UnknownModel(trimmed.to_string()))
    }
}

impl Serialize for VideoModel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for VideoModel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Input mode. Each model belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DualFrame,
    TextOnly,
    ImageConditioned,
}

impl Mode {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::DualFrame => Endpoint::Image2Video,
            Self::TextOnly | Self::ImageConditioned => Endpoint::VideoGeneration,
        }
    }
}

/// Submission endpoints, relative to the service base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Image2Video,
    VideoGeneration,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Image2Video => "/services/aigc/image2video/video-synthesis",
            Self::VideoGeneration => "/services/aigc/video-generation/video-synthesis",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "480P")]
    P480,
    #[serde(rename = "720P")]
    P720,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P480 => "480P",
            Self::P720 => "720P",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::P720
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "480P" => Ok(Self::P480),
            "720P" => Ok(Self::P720),
            other => Err(format!("unsupported resolution '{other}'")),
        }
    }
}

/// Output frame size for text-to-video, `width*height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSize {
    #[serde(rename = "1280*720")]
    Landscape,
    #[serde(rename = "720*1280")]
    Portrait,
    #[serde(rename = "1024*1024")]
    Square,
}

impl VideoSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "1280*720",
            Self::Portrait => "720*1280",
            Self::Square => "1024*1024",
        }
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for VideoSize {
    fn default() -> Self {
        Self::Landscape
    }
}

impl FromStr for VideoSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace(['x', 'X'], "*").as_str() {
            "1280*720" => Ok(Self::Landscape),
            "720*1280" => Ok(Self::Portrait),
            "1024*1024" => Ok(Self::Square),
            other => Err(format!("unsupported size '{other}'")),
        }
    }
}
