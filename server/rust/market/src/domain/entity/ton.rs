use crate::domain::MarketError;

/// 1 TON あたりの nanoton
pub const NANOTONS_PER_TON: u64 = 1_000_000_000;

const MAX_DECIMALS: usize = 9;

/// "1.5" のような 10 進表記の TON 金額を nanoton に変換する。
///
/// 浮動小数点を経由しないため丸め誤差は生じない。小数点以下 10 桁以上、
/// 負数、ゼロは拒否する。
pub fn parse_ton_amount(input: &str) -> Result<u64, MarketError> {
    let invalid = || MarketError::InvalidAmount(input.to_string());
    let trimmed = input.trim();
    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > MAX_DECIMALS
    {
        return Err(invalid());
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction: u64 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<MAX_DECIMALS$}");
        padded.parse().map_err(|_| invalid())?
    };

    let nanotons = whole
        .checked_mul(NANOTONS_PER_TON)
        .and_then(|n| n.checked_add(fraction))
        .ok_or_else(invalid)?;
    if nanotons == 0 {
        return Err(invalid());
    }
    Ok(nanotons)
}
