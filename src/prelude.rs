pub use std::collections::HashMap;

pub use once_cell::sync::Lazy;
pub use regex::Regex;
pub use serde::{Deserialize, Serialize};
pub use tracing::{debug, trace, warn};
pub use url::Url;

pub use crate::error::{BlobseekError, Result};
pub use crate::try_from_str_boilerplate;
