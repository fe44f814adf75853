//! Wiederholungs-Strategie an der Transport-Grenze
//!
//! Standard: 3 Versuche, linear 2 s und 4 s Pause dazwischen.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wachstum der Pause zwischen zwei Versuchen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `basis * versuch`
    #[default]
    Linear,
    /// `basis * 2^(versuch - 1)`
    Exponentiell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_versuche: u32,
    pub basis_verzoegerung: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_versuche: 3,
            basis_verzoegerung: Duration::from_millis(2000),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Genau ein Versuch, keine Pause
    pub fn einmalig() -> Self {
        Self {
            max_versuche: 1,
            basis_verzoegerung: Duration::ZERO,
            backoff: Backoff::Linear,
        }
    }

    /// Pause nach dem fehlgeschlagenen Versuch `versuch` (1-basiert)
    pub fn verzoegerung(&self, versuch: u32) -> Duration {
        let faktor = match self.backoff {
            Backoff::Linear => versuch.max(1),
            Backoff::Exponentiell => 1u32
                .checked_shl(versuch.saturating_sub(1))
                .unwrap_or(u32::MAX),
        };
        self.basis_verzoegerung.saturating_mul(faktor)
    }

    /// Fuehrt `operation` aus, bis sie gelingt oder die Versuche aufgebraucht sind
    ///
    /// Die Closure bekommt die Versuchsnummer (1-basiert). Zurueckgegeben wird
    /// das Ergebnis des letzten Versuchs.
    pub async fn ausfuehren<T, E, F, Fut>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.ausfuehren_wenn(operation, |_| true, f).await
    }

    /// Wie `ausfuehren`, aber nur Fehler, fuer die `wiederholbar` gilt,
    /// loesen einen weiteren Versuch aus
    pub async fn ausfuehren_wenn<T, E, P, F, Fut>(
        &self,
        operation: &str,
        wiederholbar: P,
        mut f: F,
    ) -> Result<T, E>
    where
        P: Fn(&E) -> bool,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max = self.max_versuche.max(1);
        let mut versuch = 1;
        loop {
            match f(versuch).await {
                Ok(wert) => return Ok(wert),
                Err(e) if !wiederholbar(&e) => {
                    tracing::debug!(operation, versuch, fehler = %e, "Fehler nicht wiederholbar");
                    return Err(e);
                }
                Err(e) if versuch < max => {
                    let pause = self.verzoegerung(versuch);
                    tracing::debug!(
                        operation,
                        versuch,
                        max_versuche = max,
                        pause_ms = pause.as_millis() as u64,
                        fehler = %e,
                        "Versuch fehlgeschlagen, wiederhole"
                    );
                    tokio::time::sleep(pause).await;
                    versuch += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        versuche = max,
                        fehler = %e,
                        "Alle Versuche fehlgeschlagen"
                    );
                    return Err(e);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
