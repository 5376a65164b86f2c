use alloy::primitives::{keccak256, B256};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("event signature {0} is declared more than once")]
    DuplicateName(String),
    #[error("event signatures {0} and {1} share the selector {2}")]
    DuplicateSelector(String, String, B256),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RebaseFailed,
    TargetPriceUpdated,
    MintExecuted,
    BurnExecuted,
    Transfer,
}

impl EventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RebaseFailed => "RebaseFailed",
            Self::TargetPriceUpdated => "TargetPriceUpdated",
            Self::MintExecuted => "MintExecuted",
            Self::BurnExecuted => "BurnExecuted",
            Self::Transfer => "Transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Address,
    Uint(u16),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Address => f.write_str("address"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventParam {
    pub name: String,
    pub kind: ParamKind,
    pub indexed: bool,
}

/// Name and ordered parameter list of one event the contract emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSignature {
    pub name: String,
    pub params: Vec<EventParam>,
}

impl EventSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(EventParam {
            name: name.into(),
            kind,
            indexed: false,
        });
        self
    }

    pub fn indexed(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(EventParam {
            name: name.into(),
            kind,
            indexed: true,
        });
        self
    }

    /// Canonical ABI form, e.g. `Transfer(address,address,uint256)`.
    pub fn canonical(&self) -> String {
        let types: Vec<String> = self.params.iter().map(|p| p.kind.to_string()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    /// Topic 0 of every log matching this signature.
    pub fn selector(&self) -> B256 {
        keccak256(self.canonical().as_bytes())
    }

    /// Topics a non-anonymous log of this event carries: the selector plus
    /// one per indexed parameter.
    pub fn topic_count(&self) -> usize {
        1 + self.params.iter().filter(|p| p.indexed).count()
    }
}

/// Human-readable declaration, e.g.
/// `Transfer(address indexed from, address indexed to, uint256 amount)`.
impl fmt::Display for EventSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param.kind)?;
            if param.indexed {
                f.write_str(" indexed")?;
            }
            write!(f, " {}", param.name)?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    kind: EventKind,
    signature: EventSignature,
    selector: B256,
}

/// Fixed set of event signatures for one contract version.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(
        signatures: impl IntoIterator<Item = (EventKind, EventSignature)>,
    ) -> Result<Self, CatalogError> {
        let mut names = HashSet::new();
        let mut entries: Vec<CatalogEntry> = Vec::new();
        for (kind, signature) in signatures {
            if !names.insert(signature.name.clone()) {
                return Err(CatalogError::DuplicateName(signature.name));
            }
            let selector = signature.selector();
            if let Some(clash) = entries.iter().find(|e| e.selector == selector) {
                return Err(CatalogError::DuplicateSelector(
                    clash.signature.name.clone(),
                    signature.name,
                    selector,
                ));
            }
            entries.push(CatalogEntry {
                kind,
                signature,
                selector,
            });
        }
        Ok(Self { entries })
    }

    /// The AlgoUSD event set plus the standard token `Transfer`.
    pub fn algousd() -> Result<Self, CatalogError> {
        Self::new([
            (
                EventKind::RebaseFailed,
                EventSignature::new("RebaseFailed").param("reason", ParamKind::String),
            ),
            (
                EventKind::TargetPriceUpdated,
                EventSignature::new("TargetPriceUpdated")
                    .param("newTargetPrice", ParamKind::Uint(256)),
            ),
            (
                EventKind::MintExecuted,
                EventSignature::new("MintExecuted")
                    .param("to", ParamKind::Address)
                    .param("amount", ParamKind::Uint(256)),
            ),
            (
                EventKind::BurnExecuted,
                EventSignature::new("BurnExecuted")
                    .param("from", ParamKind::Address)
                    .param("amount", ParamKind::Uint(256)),
            ),
            (
                EventKind::Transfer,
                EventSignature::new("Transfer")
                    .indexed("from", ParamKind::Address)
                    .indexed("to", ParamKind::Address)
                    .param("amount", ParamKind::Uint(256)),
            ),
        ])
    }

    pub fn lookup(&self, selector: &B256) -> Option<(EventKind, &EventSignature)> {
        self.entries
            .iter()
            .find(|e| &e.selector == selector)
            .map(|e| (e.kind, &e.signature))
    }

    pub fn selectors(&self) -> Vec<B256> {
        self.entries.iter().map(|e| e.selector).collect()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &EventSignature> {
        self.entries.iter().map(|e| &e.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::abi;
    use alloy::sol_types::SolEvent;

    #[test]
    fn selectors_match_typed_bindings() {
        let catalog = Catalog::algousd().unwrap();
        let expected = [
            (EventKind::RebaseFailed, abi::RebaseFailed::SIGNATURE_HASH),
            (EventKind::TargetPriceUpdated, abi::TargetPriceUpdated::SIGNATURE_HASH),
            (EventKind::MintExecuted, abi::MintExecuted::SIGNATURE_HASH),
            (EventKind::BurnExecuted, abi::BurnExecuted::SIGNATURE_HASH),
            (EventKind::Transfer, abi::Transfer::SIGNATURE_HASH),
        ];
        for (kind, hash) in expected {
            let (found, signature) = catalog.lookup(&hash).unwrap();
            assert_eq!(found, kind);
            assert_eq!(signature.name, kind.name());
        }
        assert_eq!(catalog.selectors().len(), 5);
    }

    #[test]
    fn canonical_form_is_bit_exact() {
        let catalog = Catalog::algousd().unwrap();
        let canonical: Vec<String> = catalog.signatures().map(|s| s.canonical()).collect();
        assert_eq!(
            canonical,
            [
                "RebaseFailed(string)",
                "TargetPriceUpdated(uint256)",
                "MintExecuted(address,uint256)",
                "BurnExecuted(address,uint256)",
                "Transfer(address,address,uint256)",
            ]
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = Catalog::new([
            (
                EventKind::RebaseFailed,
                EventSignature::new("RebaseFailed").param("reason", ParamKind::String),
            ),
            (
                EventKind::RebaseFailed,
                EventSignature::new("RebaseFailed").param("code", ParamKind::Uint(8)),
            ),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateName("RebaseFailed".into()));
    }

    #[test]
    fn declaration_lists_indexed_parameters() {
        let catalog = Catalog::algousd().unwrap();
        let (_, transfer) = catalog.lookup(&abi::Transfer::SIGNATURE_HASH).unwrap();
        assert_eq!(
            transfer.to_string(),
            "Transfer(address indexed from, address indexed to, uint256 amount)"
        );
        assert_eq!(transfer.topic_count(), 3);

        let (_, mint) = catalog.lookup(&abi::MintExecuted::SIGNATURE_HASH).unwrap();
        assert_eq!(mint.to_string(), "MintExecuted(address to, uint256 amount)");
        assert_eq!(mint.topic_count(), 1);
    }

    #[test]
    fn unknown_selector_is_not_found() {
        let catalog = Catalog::algousd().unwrap();
        assert!(catalog.lookup(&B256::repeat_byte(0x42)).is_none());
    }
}
