use capl_core::ExtractOptions;
use serde::Deserialize;

/// Root configuration for the capl-lsp server.
///
/// Provided by the LSP client through `initializationOptions`. Every field
/// has a default, so partial (or empty) option objects are accepted.
///
/// # Examples
///
/// ```
/// use capl_lsp::config::CaplConfig;
///
/// let json = r#"{
///     "symbols": { "include_locals": true },
///     "sync": { "incremental": false }
/// }"#;
///
/// let config: CaplConfig = serde_json::from_str(json).unwrap();
/// assert!(config.symbols.include_locals);
/// assert!(config.symbols.include_details);
/// assert!(!config.sync.incremental);
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CaplConfig {
    #[serde(default)]
    pub symbols: SymbolsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Configuration for the document outline.
///
/// # Defaults
///
/// - `include_locals`: `false`
/// - `include_details`: `true`
/// - `max_depth`: `32` (clamped to `1..=256`)
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolsConfig {
    /// Report variables declared inside function and handler bodies.
    #[serde(default)]
    pub include_locals: bool,

    /// Send `detail` (event arguments, signatures, types) with each symbol.
    #[serde(default = "default_true")]
    pub include_details: bool,

    /// Deepest nesting level sent to the client. Top-level symbols are level 1.
    #[serde(default = "default_max_depth", deserialize_with = "deserialize_max_depth")]
    pub max_depth: usize,
}

impl SymbolsConfig {
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            include_locals: self.include_locals,
            include_details: self.include_details,
        }
    }
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            include_locals: false,
            include_details: true,
            max_depth: default_max_depth(),
        }
    }
}

/// Configuration for text synchronization.
///
/// # Defaults
///
/// - `incremental`: `true` (range edits); `false` makes the client send the
///   whole document on every change
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub incremental: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { incremental: true }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_max_depth() -> usize {
    32
}

/// Bounds for `max_depth`.
const MIN_MAX_DEPTH: usize = 1;
const MAX_MAX_DEPTH: usize = capl_core::MAX_NESTING;

fn validate_max_depth(depth: usize) -> usize {
    let clamped = depth.clamp(MIN_MAX_DEPTH, MAX_MAX_DEPTH);
    if clamped != depth {
        tracing::warn!(
            "max_depth {} outside {}..={}, using {}",
            depth,
            MIN_MAX_DEPTH,
            MAX_MAX_DEPTH,
            clamped
        );
    }
    clamped
}

fn deserialize_max_depth<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let depth = usize::deserialize(deserializer)?;
    Ok(validate_max_depth(depth))
}
