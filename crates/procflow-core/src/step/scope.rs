//! Scopes de transacción e historial.
//!
//! `Wrap` abre y cierra dentro del mismo step; `Begin`/`End` abren y cierran
//! en steps distintos y deben anidar como paréntesis. El balance se comprueba
//! al cerrar con un contador de profundidad.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionMode {
    #[default]
    None,
    Wrap,
    Begin,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryMode {
    #[default]
    None,
    Wrap,
    Begin,
    End,
}

impl TransactionMode {
    pub fn opens(self) -> bool {
        matches!(self, Self::Wrap | Self::Begin)
    }

    pub fn closes(self) -> bool {
        matches!(self, Self::Wrap | Self::End)
    }
}

impl HistoryMode {
    pub fn opens(self) -> bool {
        matches!(self, Self::Wrap | Self::Begin)
    }

    pub fn closes(self) -> bool {
        matches!(self, Self::Wrap | Self::End)
    }
}

/// Profundidad de scopes abiertos en un proceso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeDepths {
    pub transaction: u32,
    pub history: u32,
}

impl ScopeDepths {
    pub fn is_balanced(&self) -> bool {
        self.transaction == 0 && self.history == 0
    }

    /// `true` si todos los scopes contados aquí siguen abiertos en `open`.
    pub fn is_within(&self, open: ScopeDepths) -> bool {
        self.transaction <= open.transaction && self.history <= open.history
    }
}
