//! Puffer fuer Nachrichten, die noch nicht entschluesselt werden konnten
//!
//! Typischer Fall: die Nachricht kommt an, bevor der Public Key des
//! Absenders bekannt ist. Eintraege werden nie verworfen, sondern bei jedem
//! Durchlauf erneut versucht (aeltester zuerst).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use fluesterpost_core::PeerId;
use fluesterpost_crypto::EncryptedEnvelope;
use parking_lot::Mutex;

/// Ein zurueckgestellter Entschluesselungsversuch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AusstehendeEntschluesselung {
    pub envelope: EncryptedEnvelope,
    pub sender: PeerId,
    pub empfangen_am: DateTime<Utc>,
    /// Anzahl bisheriger Fehlversuche
    pub versuche: u32,
}

impl AusstehendeEntschluesselung {
    pub fn neu(envelope: EncryptedEnvelope, sender: PeerId) -> Self {
        Self {
            envelope,
            sender,
            empfangen_am: Utc::now(),
            versuche: 1,
        }
    }
}

impl AusstehendeEntschluesselung {
    fn gleiche_nachricht(&self, andere: &Self) -> bool {
        self.sender == andere.sender && self.envelope == andere.envelope
    }
}

#[derive(Debug, Default)]
struct Inhalt {
    wartend: VecDeque<AusstehendeEntschluesselung>,
    /// Von `alle_entnehmen` ausgegeben, bis `zurueckstellen` sie abschliesst
    in_arbeit: Vec<AusstehendeEntschluesselung>,
}

/// FIFO-Puffer fuer zurueckgestellte Entschluesselungen
#[derive(Debug, Default)]
pub struct PendingDecryptBuffer {
    inhalt: Mutex<Inhalt>,
}

impl PendingDecryptBuffer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt einen Eintrag hinten an
    ///
    /// Ein identisches Envelope vom selben Absender wird nicht doppelt
    /// gepuffert (z.B. wenn die UI dieselbe Nachricht zweimal zustellt),
    /// auch nicht, waehrend es gerade in einem Durchlauf steckt.
    pub fn hinzufuegen(&self, eintrag: AusstehendeEntschluesselung) -> bool {
        let mut inhalt = self.inhalt.lock();
        let doppelt = inhalt
            .wartend
            .iter()
            .chain(inhalt.in_arbeit.iter())
            .any(|e| e.gleiche_nachricht(&eintrag));
        if doppelt {
            return false;
        }
        inhalt.wartend.push_back(eintrag);
        true
    }

    /// Entnimmt alle Eintraege (aeltester zuerst) fuer einen Durchlauf
    pub fn alle_entnehmen(&self) -> Vec<AusstehendeEntschluesselung> {
        let mut inhalt = self.inhalt.lock();
        let entnommen: Vec<_> = inhalt.wartend.drain(..).collect();
        inhalt.in_arbeit.extend(entnommen.iter().cloned());
        entnommen
    }

    /// Schliesst einen Durchlauf ab: fehlgeschlagene Eintraege kommen vor
    /// die inzwischen neu hinzugekommenen, Reihenfolge bleibt erhalten
    pub fn zurueckstellen(&self, fehlgeschlagen: Vec<AusstehendeEntschluesselung>) {
        let mut inhalt = self.inhalt.lock();
        inhalt.in_arbeit.clear();
        for eintrag in fehlgeschlagen.into_iter().rev() {
            inhalt.wartend.retain(|e| !e.gleiche_nachricht(&eintrag));
            inhalt.wartend.push_front(eintrag);
        }
    }

    pub fn len(&self) -> usize {
        self.inhalt.lock().wartend.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inhalt.lock().wartend.is_empty()
    }

    /// Anzahl gepufferter Nachrichten eines Absenders
    pub fn fuer_peer(&self, peer: &PeerId) -> usize {
        self.inhalt
            .lock()
            .wartend
            .iter()
            .filter(|e| &e.sender == peer)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluesterpost_crypto::Nonce;

    fn eintrag(sender: &str, byte: u8) -> AusstehendeEntschluesselung {
        AusstehendeEntschluesselung::neu(
            EncryptedEnvelope {
                ciphertext: vec![byte; 20],
                nonce: Nonce::from_slice(&[byte; 24]).unwrap(),
                sender_public_key: None,
            },
            PeerId::new(sender),
        )
    }

    #[test]
    fn zurueckstellen_erhaelt_reihenfolge() {
        let puffer = PendingDecryptBuffer::neu();
        puffer.hinzufuegen(eintrag("1", 1));
        puffer.hinzufuegen(eintrag("1", 2));

        let entnommen = puffer.alle_entnehmen();
        assert!(puffer.is_empty());

        // Waehrend der Verarbeitung kommt ein neuer Eintrag hinzu
        puffer.hinzufuegen(eintrag("2", 3));
        puffer.zurueckstellen(entnommen);

        let reihenfolge: Vec<u8> = puffer
            .alle_entnehmen()
            .iter()
            .map(|e| e.envelope.ciphertext[0])
            .collect();
        assert_eq!(reihenfolge, vec![1, 2, 3]);
    }

    #[test]
    fn doppelte_nachricht_wird_nicht_gepuffert() {
        let puffer = PendingDecryptBuffer::neu();
        assert!(puffer.hinzufuegen(eintrag("1", 1)));
        assert!(!puffer.hinzufuegen(eintrag("1", 1)));
        assert!(puffer.hinzufuegen(eintrag("2", 1)));
        assert_eq!(puffer.len(), 2);
        assert_eq!(puffer.fuer_peer(&PeerId::new("1")), 1);
    }

    #[test]
    fn erneute_zustellung_waehrend_durchlauf_wird_nicht_doppelt_gepuffert() {
        let puffer = PendingDecryptBuffer::neu();
        puffer.hinzufuegen(eintrag("1", 1));

        let entnommen = puffer.alle_entnehmen();
        // Die UI stellt dieselbe Nachricht waehrend des Durchlaufs erneut zu
        assert!(!puffer.hinzufuegen(eintrag("1", 1)));
        assert!(puffer.is_empty());

        puffer.zurueckstellen(entnommen);
        assert_eq!(puffer.len(), 1);

        // Nach dem Durchlauf greift wieder die normale Pruefung
        assert!(!puffer.hinzufuegen(eintrag("1", 1)));
        puffer.zurueckstellen(puffer.alle_entnehmen().into_iter().skip(1).collect());
        assert!(puffer.hinzufuegen(eintrag("1", 1)));
    }
}
