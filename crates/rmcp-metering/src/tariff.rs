use std::collections::BTreeMap;

/// Fixed per-call prices, in cents, keyed by operation name. An operation
/// that is not in the tariff is not callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tariff {
    rates: BTreeMap<String, u32>,
}

impl Tariff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, operation: impl Into<String>, amount_cents: u32) -> Self {
        self.rates.insert(operation.into(), amount_cents);
        self
    }

    pub fn rate(&self, operation: &str) -> Option<u32> {
        self.rates.get(operation).copied()
    }

    pub fn is_registered(&self, operation: &str) -> bool {
        self.rates.contains_key(operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = (&str, u32)> {
        self.rates.iter().map(|(name, cents)| (name.as_str(), *cents))
    }
}
