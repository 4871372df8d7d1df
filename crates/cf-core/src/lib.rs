mod model_types;
pub mod error;
pub mod spec;

pub use error::{UrlField, ValidationError};
pub use model_types::{Endpoint, Mode, Resolution, UnknownModel, VideoModel, VideoSize};
pub use spec::{BuiltRequest, JobForm, JobSpec, RequestDocument};
