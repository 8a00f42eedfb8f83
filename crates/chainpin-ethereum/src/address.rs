//! Ethereum address validation.

use chainpin_core::PluginError;

/// Normalizes a 20-byte hex address to lowercase with a `0x` prefix.
///
/// The prefix is optional on input and may be `0x` or `0X`.
pub fn validate_eth_address(key: &str) -> Result<String, PluginError> {
    let lower = key.to_ascii_lowercase();
    let raw = lower.strip_prefix("0x").unwrap_or(&lower);
    if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(format!("0x{raw}"))
    } else {
        Err(PluginError::InvalidAddress(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_normalizes() {
        assert_eq!(
            validate_eth_address("0X91D2B4381A4CD5C7C0F27565A7D4B829844C8635").unwrap(),
            "0x91d2b4381a4cd5c7c0f27565a7d4b829844c8635"
        );
        assert_eq!(
            validate_eth_address("3081D84FD367044F4ED453F2024709242470388C").unwrap(),
            "0x3081d84fd367044f4ed453f2024709242470388c"
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in ["", "bad", "0x12345", "!good", "0x91d2b4381a4cd5c7c0f27565a7d4b829844c86zz"] {
            assert!(
                matches!(validate_eth_address(bad), Err(PluginError::InvalidAddress(_))),
                "{bad}"
            );
        }
    }
}
