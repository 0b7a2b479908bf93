//! Constantes del motor core.

/// Versión lógica del motor. Forma parte del fingerprint de cierre de cada
/// proceso, de modo que un cambio incompatible del engine produce
/// fingerprints distintos aunque el estado final sea el mismo.
pub const ENGINE_VERSION: &str = "1.0";
