pub mod cel;
pub mod config;
pub mod costs;
pub mod extproc;
pub mod http;
pub mod llm;
pub mod mcp;
pub mod management;
pub mod parse;
pub mod processor;
pub mod serdes;
pub mod strng;
pub mod telemetry;

mod prelude {
	pub use std::collections::HashMap;
	pub use std::fmt::{Debug, Display};
	pub use std::sync::Arc;
	pub use std::time::{Duration, Instant};

	pub use anyhow::Context as _;
	pub use bytes::Bytes;
	pub use serde::{Deserialize, Serialize};
	pub use tracing::{debug, error, info, trace, warn};

	pub use crate::strng;
	pub use crate::strng::Strng;
}

pub(crate) use prelude::*;

/// Header set by the router phase carrying the model parsed out of the
/// request body. The proxy's route match keys off this header.
pub const MODEL_NAME_HEADER: &str = "x-ai-eg-model-name";
/// Header preserving the client's original `:path` across route rewrites.
pub const ORIGINAL_PATH_HEADER: &str = "x-ai-eg-original-path";
/// Header the proxy attaches when it re-enters the stream with a resolved
/// backend (once per attempt, so it is repeated on retry).
pub const SELECTED_BACKEND_HEADER: &str = "x-ai-eg-selected-backend";

/// Namespace for the dynamic metadata emitted back to the proxy.
pub const DYNAMIC_METADATA_NAMESPACE: &str = "ai_gateway_llm_ns";
