//! Exact token counting against the model's BPE tables.
//!
//! Counts drive billed-usage reporting, so the encoder must match the
//! model's real token boundaries; swapping in an approximation changes
//! the reported numbers and is a compatibility break.

use tiktoken_rs::CoreBPE;

use crate::error::RelayError;

fn bpe_for(encoding: &str) -> Option<&'static CoreBPE> {
    match encoding {
        "cl100k_base" => Some(tiktoken_rs::cl100k_base_singleton()),
        "o200k_base" => Some(tiktoken_rs::o200k_base_singleton()),
        "p50k_base" => Some(tiktoken_rs::p50k_base_singleton()),
        "r50k_base" => Some(tiktoken_rs::r50k_base_singleton()),
        _ => None,
    }
}

/// Count the tokens in `text` under the named encoding.
///
/// Deterministic and pure for a fixed encoding table.
///
/// # Errors
///
/// Returns `RelayError::Config` for an unknown encoding name; this is a
/// deployment mistake, not a per-request condition.
pub fn count_tokens(text: &str, encoding: &str) -> Result<u64, RelayError> {
    let bpe = bpe_for(encoding)
        .ok_or_else(|| RelayError::Config(format!("unknown token encoding '{encoding}'")))?;
    Ok(bpe.encode_with_special_tokens(text).len() as u64)
}

/// Encoders take noticeable time to build and are lazily initialized.
/// Load the configured one at startup, outside the request path.
pub fn preload(encoding: &str) {
    let _ = bpe_for(encoding);
}
