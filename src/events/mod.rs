use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::MATERIAL_NOT_FOUND_MESSAGE;

/// How loudly the kiosk surfaces an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

// Define the various events the reconciliation flow reports to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    KitMergeLoaded {
        kit_merge_id: i64,
        kits: Vec<String>,
    },
    /// No in-progress batch at the gate; the display is blank.
    KitMergeIdle {
        gate: String,
    },
    PtlRecordsLoaded {
        count: usize,
    },
    MaterialSelected {
        material_no: String,
        visible: usize,
    },
    PickedQtyUpdated {
        record_id: i64,
        material_no: String,
        picked_qty: i64,
    },
    /// A failed update rolled the optimistic change back.
    PickedQtyReverted {
        record_id: i64,
        restored_qty: i64,
        attempted_qty: i64,
    },
    /// A quantity scan matched no displayed slot. `scanned` is the value as read.
    MaterialNotFound {
        material_no: Option<String>,
        scanned: String,
    },
    /// More than one visible slot requires the scanned quantity.
    AmbiguousQuantityMatch {
        quantity: i64,
        record_ids: Vec<i64>,
        chosen: i64,
    },
    ScanDiscarded {
        raw: String,
    },
    RemoteError {
        message: String,
    },
}

impl Event {
    pub fn severity(&self) -> Severity {
        match self {
            Event::MaterialNotFound { .. } | Event::AmbiguousQuantityMatch { .. } => {
                Severity::Warning
            }
            Event::RemoteError { .. } | Event::PickedQtyReverted { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// One-line operator text for the event.
    pub fn message(&self) -> String {
        match self {
            Event::KitMergeLoaded { kit_merge_id, kits } => {
                format!("kit merge {} loaded ({})", kit_merge_id, kits.join(", "))
            }
            Event::KitMergeIdle { gate } => format!("no kit merge in progress at gate {}", gate),
            Event::PtlRecordsLoaded { count } => format!("{} PTL slot(s) loaded", count),
            Event::MaterialSelected {
                material_no,
                visible,
            } => format!("material {}: {} slot(s)", material_no, visible),
            Event::PickedQtyUpdated {
                record_id,
                material_no,
                picked_qty,
            } => format!(
                "slot {} ({}) picked qty set to {}",
                record_id, material_no, picked_qty
            ),
            Event::PickedQtyReverted {
                record_id,
                restored_qty,
                attempted_qty,
            } => format!(
                "slot {} update to {} failed, restored {}",
                record_id, attempted_qty, restored_qty
            ),
            Event::MaterialNotFound { .. } => MATERIAL_NOT_FOUND_MESSAGE.to_string(),
            Event::AmbiguousQuantityMatch {
                quantity,
                record_ids,
                chosen,
            } => format!(
                "{} slots require {} ({:?}); updated slot {}",
                record_ids.len(),
                quantity,
                record_ids,
                chosen
            ),
            Event::ScanDiscarded { raw } => format!("ignored scan {:?}", raw),
            Event::RemoteError { message } => message.clone(),
        }
    }
}

/// An event stamped with the time it was raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub event: Event,
    pub severity: Severity,
    pub raised_at: DateTime<Utc>,
}

impl From<Event> for Notice {
    fn from(event: Event) -> Self {
        Self {
            severity: event.severity(),
            event,
            raised_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Notice>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Notice>) -> Self {
        Self { sender }
    }

    /// Channel pair with the given capacity.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(Notice::from(event))
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    pub async fn notify(&self, event: Event) {
        if let Err(err) = self.send(event).await {
            warn!(error = %err, "operator notice dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notices_carry_event_severity() {
        let (sender, mut rx) = EventSender::channel(4);
        sender
            .notify(Event::MaterialNotFound {
                material_no: Some("60988953".into()),
                scanned: "99".into(),
            })
            .await;

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.severity, Severity::Warning);
        assert_eq!(notice.event.message(), "material not found in order");
    }

    #[tokio::test]
    async fn notify_survives_a_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);
        sender.notify(Event::PtlRecordsLoaded { count: 2 }).await;
        assert!(sender.send(Event::PtlRecordsLoaded { count: 2 }).await.is_err());
    }
}
