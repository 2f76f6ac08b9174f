//! Centralized default constants for the tagging engine.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs and service options reference these constants
//! instead of defining their own magic numbers.

// =============================================================================
// TAG NAMES
// =============================================================================

/// Maximum number of characters in a tag name.
pub const MAX_TAG_LENGTH: usize = 50;

/// Whether tag names are lowercased before lookup and creation.
pub const FORCE_LOWERCASE: bool = false;

/// Separator used when rendering a tag list back into a single string.
pub const RENDER_SEPARATOR: &str = ", ";

// =============================================================================
// TAG CLOUDS
// =============================================================================

/// Number of font size buckets in a tag cloud.
pub const CLOUD_STEPS: u32 = 4;

// =============================================================================
// STORAGE
// =============================================================================

/// Attempts made by get-or-create before a unique-constraint race is
/// reported as a conflict.
pub const GET_OR_CREATE_ATTEMPTS: usize = 2;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Environment variable toggling lowercase tag names.
pub const ENV_FORCE_LOWERCASE: &str = "TAGGING_FORCE_LOWERCASE";

/// Environment variable overriding the maximum tag name length.
pub const ENV_MAX_TAG_LENGTH: &str = "TAGGING_MAX_TAG_LENGTH";

/// Environment variable forcing a single delimiter character.
pub const ENV_FORCE_DELIMITER: &str = "TAGGING_FORCE_DELIMITER";
