use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::AgendamentoDetalheRow;

/// A notification the core has decided is due. Delivery (email/SMS) is an
/// external collaborator; the contract here ends at "kind K with payload P".
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum Notification {
    Confirmacao {
        agendamento: AgendamentoDetalheRow,
    },
    Cancelamento {
        agendamento: AgendamentoDetalheRow,
    },
    Remarcacao {
        agendamento: AgendamentoDetalheRow,
        data_anterior: String,
    },
    CodigoVerificacao {
        email: String,
        empresa: String,
        codigo: String,
    },
}

impl Notification {
    fn describe(&self) -> String {
        match self {
            Notification::Confirmacao { agendamento } => format!(
                "confirmacao para {} ({} com {} em {})",
                agendamento.cliente_nome,
                agendamento.servico_nome,
                agendamento.funcionario_nome,
                agendamento.data_inicio
            ),
            Notification::Cancelamento { agendamento } => format!(
                "cancelamento para {} ({} em {})",
                agendamento.cliente_nome, agendamento.servico_nome, agendamento.data_inicio
            ),
            Notification::Remarcacao {
                agendamento,
                data_anterior,
            } => format!(
                "remarcacao para {} ({} -> {})",
                agendamento.cliente_nome, data_anterior, agendamento.data_inicio
            ),
            Notification::CodigoVerificacao { email, empresa, .. } => {
                format!("codigo de verificacao para {email} ({empresa})")
            }
        }
    }
}

/// Fire-and-forget sender handed to request handlers. A full or closed
/// channel is logged and swallowed; the triggering request has already
/// committed and must not fail because of delivery.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn send(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            log::warn!("Notification dropped: {err}");
        }
    }
}

/// Build the channel pair. The receiver side is consumed by [`run_worker`].
pub fn channel() -> (Notifier, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Notifier { tx }, rx)
}

/// Worker loop: one delivery attempt per message, failures logged. Runs until
/// every sender is dropped.
pub async fn run_worker(mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match deliver(&notification) {
            Ok(()) => log::info!("Notification sent: {}", notification.describe()),
            Err(err) => log::warn!("Notification failed ({err}): {}", notification.describe()),
        }
    }
}

fn deliver(notification: &Notification) -> Result<(), serde_json::Error> {
    // Outbound email/SMS is wired in deployment; the dispatch contract stops
    // at a serialized payload.
    let payload = serde_json::to_string(notification)?;
    log::debug!("Notification payload: {payload}");
    Ok(())
}
