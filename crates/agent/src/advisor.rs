use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dashboard area the user is likely to visit next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Inventario,
    Codigos,
    Movimentacoes,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventario => "inventario",
            Self::Codigos => "codigos",
            Self::Movimentacoes => "movimentacoes",
        }
    }
}

/// Counts observed on the session after the current turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvisorSignals {
    pub code_count: usize,
    pub exchange_count: usize,
}

/// Best-effort hint source. Callers treat any error as "no hint".
#[async_trait]
pub trait NextActionAdvisor: Send + Sync {
    async fn predict(&self, signals: AdvisorSignals) -> Result<NextAction>;
}

/// Threshold rules over the same two signals the trained classifier used.
#[derive(Clone, Copy, Debug)]
pub struct HeuristicAdvisor {
    pub movement_after_exchanges: usize,
}

impl Default for HeuristicAdvisor {
    fn default() -> Self {
        Self { movement_after_exchanges: 3 }
    }
}

#[async_trait]
impl NextActionAdvisor for HeuristicAdvisor {
    async fn predict(&self, signals: AdvisorSignals) -> Result<NextAction> {
        let action = match signals {
            AdvisorSignals { code_count: 0, .. } => NextAction::Inventario,
            AdvisorSignals { exchange_count, .. } if exchange_count >= self.movement_after_exchanges => {
                NextAction::Movimentacoes
            }
            _ => NextAction::Codigos,
        };
        Ok(action)
    }
}
