//! Engine configuration

use serde::{Deserialize, Serialize};

/// Tunable limits and defaults for the challenge engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum comment length in characters
    #[serde(default = "default_max_comment_length")]
    pub max_comment_length: usize,

    /// Expiry window applied when a challenge does not specify one
    #[serde(default = "default_expiry_days")]
    pub default_expiry_days: u32,

    /// Object-store path prefix for uploaded response videos
    #[serde(default = "default_video_path_prefix")]
    pub video_path_prefix: String,

    /// Maximum accepted video payload size in bytes
    #[serde(default = "default_max_video_bytes")]
    pub max_video_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_comment_length: default_max_comment_length(),
            default_expiry_days: default_expiry_days(),
            video_path_prefix: default_video_path_prefix(),
            max_video_bytes: default_max_video_bytes(),
        }
    }
}

fn default_max_comment_length() -> usize {
    500
}

fn default_expiry_days() -> u32 {
    7
}

fn default_video_path_prefix() -> String {
    "challenge-responses".to_string()
}

fn default_max_video_bytes() -> usize {
    256 * 1024 * 1024
}
