use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

pub const ETH_DECIMALS: u8 = 18;

/// Pseudo-address the network contracts use for native ETH.
pub const ETH_ADDRESS: Address = Address::repeat_byte(0xee);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Deserialize)]
struct TokenEntry {
    address: String,
    decimals: u8,
}

/// Read-only token metadata, passed explicitly to whoever needs decimals.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, symbol: &str, address: Address, decimals: u8) -> Self {
        self.tokens.insert(
            address,
            TokenInfo {
                symbol: symbol.to_string(),
                decimals,
            },
        );
        self
    }

    /// Parses `{ "KNC": { "address": "0x...", "decimals": 18 }, ... }`.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, TokenEntry> =
            serde_json::from_str(json).context("Failed to parse token registry")?;

        let mut registry = Self::new();
        for (symbol, entry) in entries {
            let address = Address::from_str(&entry.address)
                .with_context(|| format!("Invalid address for token {}", symbol))?;
            registry = registry.with_token(&symbol, address, entry.decimals);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token registry: {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    pub fn decimals(&self, address: &Address) -> Option<u8> {
        self.get(address).map(|t| t.decimals)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Converts a base-unit amount into whole tokens.
///
/// Amounts that fit in 96 bits are scaled exactly before the final float
/// conversion; anything larger goes through `f64` directly.
pub fn scale_amount(amount: U256, decimals: u8) -> f64 {
    let limbs = amount.as_limbs();
    if limbs[2] == 0 && limbs[3] == 0 && decimals <= 28 {
        let raw = ((limbs[1] as u128) << 64) | limbs[0] as u128;
        if let Ok(raw) = i128::try_from(raw) {
            if let Ok(value) = Decimal::try_from_i128_with_scale(raw, decimals as u32) {
                if let Some(f) = value.to_f64() {
                    return f;
                }
            }
        }
    }

    amount.to_string().parse::<f64>().unwrap_or(0.0) / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_amount_exact() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u128);
        assert_eq!(scale_amount(one_and_half, 18), 1.5);
        assert_eq!(scale_amount(U256::from(123_456u64), 6), 0.123456);
        assert_eq!(scale_amount(U256::ZERO, 18), 0.0);
    }

    #[test]
    fn test_scale_amount_beyond_decimal_range() {
        // 10^40 base units with 18 decimals
        let huge = U256::from(10u64).pow(U256::from(40u64));
        let scaled = scale_amount(huge, 18);
        assert!((scaled - 1e22).abs() / 1e22 < 1e-12);
    }

    #[test]
    fn test_registry_from_json() {
        let json = r#"{
            "ETH": { "address": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee", "decimals": 18 },
            "OMG": { "address": "0xd26114cd6EE289AccF82350c8d8487fedB8A0C07", "decimals": 18 }
        }"#;
        let registry = TokenRegistry::from_json(json).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.decimals(&ETH_ADDRESS), Some(18));
        assert_eq!(registry.get(&ETH_ADDRESS).unwrap().symbol, "ETH");
    }

    #[test]
    fn test_registry_rejects_bad_address() {
        let json = r#"{ "BAD": { "address": "0x1234", "decimals": 18 } }"#;
        assert!(TokenRegistry::from_json(json).is_err());
    }

    #[test]
    fn test_registry_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{ "POWR": { "address": "0x595832f8fc6bf59c85c527fec3740a1b7a361269", "decimals": 6 } }"#,
        )
        .unwrap();

        let registry = TokenRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(TokenRegistry::load(Path::new("/nonexistent/tokens.json")).is_err());
    }
}
