use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::IdempotencyError;

/// リクエストの JSON 表現から SHA-256 フィンガープリント（16 進 64 文字）を計算する。
pub fn fingerprint<T: Serialize + ?Sized>(request: &T) -> Result<String, IdempotencyError> {
    let bytes = serde_json::to_vec(request)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
