//! Binding dialects
//!
//! Each target renders a [`BindingIR`] into source text for one client
//! language. Rendering is a pure function of the IR.

pub mod ethers;
pub mod rust;

use std::collections::HashSet;

use kiln_core::config::Dialect;

use crate::error::Result;
use crate::ir::BindingIR;

pub use ethers::EthersV5Target;
pub use rust::RustTarget;

/// Header placed at the top of every generated file
pub const GENERATED_HEADER: &str = "Autogenerated by kiln. Do not edit manually.";

/// A typed-binding flavor
pub trait BindingTarget: Send + Sync {
    /// Dialect this target emits
    fn dialect(&self) -> Dialect;

    /// File extension of generated files, without the dot
    fn extension(&self) -> &'static str;

    /// File stem of the binding for descriptor `name`
    fn file_stem(&self, name: &str) -> String {
        name.to_string()
    }

    /// File stem of the index file
    fn index_stem(&self) -> &'static str;

    /// Render one binding
    fn render(&self, ir: &BindingIR) -> Result<String>;

    /// Render the index over the given descriptor names, in order
    fn render_index(&self, names: &[String]) -> Result<String>;
}

/// Build the target for a dialect
pub fn target_for(dialect: Dialect) -> Result<Box<dyn BindingTarget>> {
    Ok(match dialect {
        Dialect::EthersV5 => Box::new(EthersV5Target::new()?),
        Dialect::Rust => Box::new(RustTarget),
    })
}

/// `locked__end` → `LockedEnd`, `balanceOf` → `BalanceOf`
pub(crate) fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// `maxSupply` → `max_supply`, `VotingEscrow` → `voting_escrow`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Replace characters that cannot appear in an identifier
pub(crate) fn identifier(name: &str, fallback: impl FnOnce() -> String) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        fallback()
    } else if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

/// Make `name` unique within `seen` by appending a counter
pub(crate) fn unique(name: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}{}", name, n);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("locked__end", "LockedEnd")]
    #[case("balanceOf", "BalanceOf")]
    #[case("claim_rewards", "ClaimRewards")]
    #[case("_value", "Value")]
    fn test_pascal_case(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(pascal_case(input), expected);
    }

    #[rstest]
    #[case("maxSupply", "max_supply")]
    #[case("VotingEscrow", "voting_escrow")]
    #[case("_addr", "_addr")]
    #[case("ERC20", "erc20")]
    fn test_snake_case(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(snake_case(input), expected);
    }

    #[test]
    fn test_identifier_and_unique() {
        assert_eq!(identifier("$price", || "arg0".into()), "_price");
        assert_eq!(identifier("", || "arg1".into()), "arg1");
        assert_eq!(identifier("2x", || "arg2".into()), "_2x");

        let mut seen = HashSet::new();
        assert_eq!(unique("value".into(), &mut seen), "value");
        assert_eq!(unique("value".into(), &mut seen), "value2");
    }

    #[test]
    fn test_target_for_dialect() {
        assert_eq!(target_for(Dialect::EthersV5).unwrap().extension(), "ts");
        let rust = target_for(Dialect::Rust).unwrap();
        assert_eq!(rust.extension(), "rs");
        assert_eq!(rust.file_stem("VotingEscrow"), "voting_escrow");
    }
}
