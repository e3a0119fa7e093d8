use serde::{Deserialize, Serialize};

/// Closed taxonomy a turn is routed through. Derived per turn, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    InventoryQty,
    ListCodes,
    DomainInfo,
    OutOfDomain,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InventoryQty => "INVENTORY_QTY",
            Self::ListCodes => "LIST_CODES",
            Self::DomainInfo => "DOMAIN_INFO",
            Self::OutOfDomain => "OUT_OF_DOMAIN",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Intent;

    #[test]
    fn serializes_as_tag() {
        let tag = serde_json::to_string(&Intent::ListCodes).expect("serialize intent");
        assert_eq!(tag, "\"LIST_CODES\"");
    }
}
