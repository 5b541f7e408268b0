//! Slash-command table.

use tracing::info;

use super::{MessageRouter, OutcomeStatus, RouterOutcome, SendGate};
use crate::mailcheck::spawn_mail_poller;

impl MessageRouter {
    /// Dispatch one command (already stripped of its prefix).
    pub(crate) async fn handle_command(&self, command: &str, reply_to: &str) -> RouterOutcome {
        let name = command
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        info!(command = %name, "Handling command");

        let reply = match name.as_str() {
            "status" => self.status_text().await,
            "help" => help_text(&self.config.command_prefix),
            "clear" => {
                self.agent.clear_history().await;
                "🧹 ¡Conversación limpiada! Empezamos de nuevo.".to_string()
            }
            "personality" => {
                let p = self.agent.personality();
                format!(
                    "🤖 Mi Personalidad:\n\n😊 Tono: {}\n📝 Formalidad: {}\n😄 Humor: {}\n🌍 Idioma: {}\n📏 Longitud: {}",
                    p.tone, p.formality, p.humor, p.language, p.response_length
                )
            }
            "summary" => self.agent.conversation_summary().await,
            "stop" => {
                self.guard.set_emergency_stop(true);
                "🚨 ASISTENTE DETENIDO\n\nEl asistente ha sido detenido para prevenir \
                 inundación de mensajes. Usa /start para reactivarlo."
                    .to_string()
            }
            "start" => {
                self.guard.set_emergency_stop(false);
                "✅ ASISTENTE ACTIVADO\n\nEl asistente está funcionando nuevamente.".to_string()
            }
            "autocheck" => self.toggle_autocheck().await,
            _ => format!(
                "Comando desconocido. Usa {}help para ver los comandos disponibles.",
                self.config.command_prefix
            ),
        };

        match self.guarded_send(reply_to, &reply).await {
            SendGate::Sent => RouterOutcome::new(OutcomeStatus::CommandResult, reply),
            SendGate::RateLimited => {
                RouterOutcome::new(OutcomeStatus::RateLimited, "too soon since last response")
            }
            SendGate::Duplicate => RouterOutcome::new(
                OutcomeStatus::DuplicateSuppressed,
                "identical response suppressed",
            ),
            SendGate::Failed(reason) => RouterOutcome::new(OutcomeStatus::Error, reason),
        }
    }

    /// Fixed status summary for `/status` and `GET /status`.
    pub async fn status_text(&self) -> String {
        let pending = self.store.list_pending().await.len();
        let (approve_patterns, reject_patterns) = self.matcher.pattern_counts().await;
        let autocheck = self.autocheck.lock().await.is_some();

        format!(
            "🤖 Estado del Sistema\n\n\
             📱 WhatsApp: {}\n\
             🤖 IA: {}\n\
             📬 Auto-revisión de correo: {}\n\
             ⏳ Acciones pendientes: {}\n\
             📐 Patrones: {} aprobar / {} rechazar",
            check(self.channel.is_configured()),
            check(self.agent.is_configured()),
            check(autocheck),
            pending,
            approve_patterns,
            reject_patterns,
        )
    }

    /// Toggle the background unread-mail poller. Starting and stopping
    /// are both safe to repeat.
    async fn toggle_autocheck(&self) -> String {
        let mut slot = self.autocheck.lock().await;
        if let Some(poller) = slot.take() {
            poller.stop();
            "❌ Auto-revisión de correo DESACTIVADA. Solo revisaré cuando me lo pidas."
                .to_string()
        } else if let Some(mail_config) = self.mail_config.clone() {
            *slot = Some(spawn_mail_poller(
                mail_config,
                self.config.clone(),
                std::sync::Arc::clone(&self.store),
                std::sync::Arc::clone(&self.agent),
                std::sync::Arc::clone(&self.channel),
            ));
            "✅ Auto-revisión de correo ACTIVADA. Revisaré correos nuevos cada minuto."
                .to_string()
        } else {
            "📧 El correo no está configurado. Define EMAIL_IMAP_HOST primero.".to_string()
        }
    }
}

fn check(on: bool) -> &'static str {
    if on { "✅" } else { "❌" }
}

fn help_text(prefix: &str) -> String {
    format!(
        "🤖 Asistente — Ayuda\n\n\
         Comandos disponibles:\n\
         {prefix}status - Estado del sistema\n\
         {prefix}help - Mostrar esta ayuda\n\
         {prefix}clear - Limpiar historial de conversación\n\
         {prefix}personality - Ver personalidad de la IA\n\
         {prefix}summary - Resumen de la conversación\n\
         {prefix}stop - Detener asistente (emergencia)\n\
         {prefix}start - Activar asistente\n\
         {prefix}autocheck - Activar/desactivar revisión de correo"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_lists_every_command() {
        let text = help_text("/");
        for cmd in [
            "/status",
            "/help",
            "/clear",
            "/personality",
            "/summary",
            "/stop",
            "/start",
            "/autocheck",
        ] {
            assert!(text.contains(cmd), "help is missing {cmd}");
        }
    }
}
