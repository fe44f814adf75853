//! Verbindungszustand `Online <-> Offline`
//!
//! Wird von Plattform-Signalen gesetzt (Netzwerk-Events der UI-Schicht),
//! nicht aus einzelnen Transportfehlern abgeleitet.

use std::sync::atomic::{AtomicBool, Ordering};

/// Ergebnis eines Zustandswechsels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uebergang {
    /// Offline -> Online, loest genau einen Sync aus
    WiederOnline,
    /// Online -> Offline, setzt weitere Syncs aus
    Getrennt,
    Unveraendert,
}

#[derive(Debug)]
pub struct Connectivity {
    online: AtomicBool,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::neu(true)
    }
}

impl Connectivity {
    pub fn neu(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn ist_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Setzt den Zustand und meldet den Uebergang
    ///
    /// Nebenlaeufige Signale mit gleichem Ziel ergeben genau einen Uebergang.
    pub fn setzen(&self, online: bool) -> Uebergang {
        let vorher = self.online.swap(online, Ordering::SeqCst);
        match (vorher, online) {
            (false, true) => {
                tracing::info!("Verbindung wiederhergestellt");
                Uebergang::WiederOnline
            }
            (true, false) => {
                tracing::info!("Verbindung verloren, Offline-Modus aktiv");
                Uebergang::Getrennt
            }
            _ => Uebergang::Unveraendert,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uebergaenge() {
        let c = Connectivity::default();
        assert!(c.ist_online());
        assert_eq!(c.setzen(true), Uebergang::Unveraendert);
        assert_eq!(c.setzen(false), Uebergang::Getrennt);
        assert_eq!(c.setzen(false), Uebergang::Unveraendert);
        assert!(!c.ist_online());
        assert_eq!(c.setzen(true), Uebergang::WiederOnline);
        assert_eq!(c.setzen(true), Uebergang::Unveraendert);
    }
}
