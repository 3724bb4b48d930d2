use rusqlite::Connection;
use uuid::Uuid;

/// SMS boundary. The hosted gateway transport is out of scope; the daemon
/// only needs "send returned a message id, or an error".
pub trait Notifier {
    fn send(&self, phone: &str, message: &str) -> anyhow::Result<String>;
}

/// Default sender: accepts everything and hands back a synthetic message id.
/// Delivery bookkeeping lives in notification_log either way.
pub struct OutboxNotifier;

impl Notifier for OutboxNotifier {
    fn send(&self, _phone: &str, message: &str) -> anyhow::Result<String> {
        if message.trim().is_empty() {
            return Err(anyhow::anyhow!("refusing to send empty message"));
        }
        Ok(Uuid::new_v4().to_string())
    }
}

pub const DEFAULT_REMINDER_TEMPLATE: &str =
    "Dear {name}, {title} has an outstanding balance of {remaining}. Please arrange payment.";

pub fn render_template(template: &str, name: &str, title: &str, remaining: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{title}", title)
        .replace("{remaining}", remaining)
}

pub fn receipt_message(name: &str, title: &str, amount: &str, remaining: &str) -> String {
    if remaining == "0.00" {
        format!(
            "Payment of {} received for {} ({}). The fee is now fully paid.",
            amount, title, name
        )
    } else {
        format!(
            "Payment of {} received for {} ({}). Outstanding balance: {}.",
            amount, title, name, remaining
        )
    }
}

/// Send one SMS and record the attempt. Never fails the caller: a dead
/// notifier or a failed log insert both degrade to a false return.
pub fn send_best_effort(
    conn: &Connection,
    notifier: &dyn Notifier,
    school_id: &str,
    phone: &str,
    message: &str,
    kind: &str,
) -> bool {
    let now = chrono::Utc::now().to_rfc3339();
    match notifier.send(phone, message) {
        Ok(message_id) => {
            let _ = conn.execute(
                "INSERT INTO notification_log(id, school_id, phone, message, kind, status, detail, created_at)
                 VALUES(?, ?, ?, ?, ?, 'sent', ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    school_id,
                    phone,
                    message,
                    kind,
                    &message_id,
                    &now,
                ),
            );
            true
        }
        Err(e) => {
            let _ = conn.execute(
                "INSERT INTO notification_log(id, school_id, phone, message, kind, status, detail, created_at)
                 VALUES(?, ?, ?, ?, ?, 'failed', ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    school_id,
                    phone,
                    message,
                    kind,
                    e.to_string(),
                    &now,
                ),
            );
            false
        }
    }
}
