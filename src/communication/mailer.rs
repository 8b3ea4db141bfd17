use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound mail. Without a configured gateway messages only reach the log.
#[derive(Debug, Clone)]
pub enum Mailer {
    Log {
        from: String,
    },
    Http {
        client: reqwest::Client,
        url: String,
        api_key: Option<String>,
        from: String,
    },
    /// Keeps every message in memory.
    Capture(Arc<Mutex<Vec<Mail>>>),
}

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

impl Mailer {
    pub fn from_config(config: &MailConfig) -> AppResult<Self> {
        match &config.api_url {
            Some(url) => Self::http(url, config.api_key.clone(), &config.from, SEND_TIMEOUT),
            None => Ok(Mailer::Log {
                from: config.from.clone(),
            }),
        }
    }

    fn http(url: &str, api_key: Option<String>, from: &str, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Mail(e.to_string()))?;
        Ok(Mailer::Http {
            client,
            url: url.to_string(),
            api_key,
            from: from.to_string(),
        })
    }

    pub fn capture() -> (Self, Arc<Mutex<Vec<Mail>>>) {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        (Mailer::Capture(outbox.clone()), outbox)
    }

    pub async fn send(&self, mail: Mail) -> AppResult<()> {
        match self {
            Mailer::Log { from } => {
                info!(%from, to = %mail.to, subject = %mail.subject, "mail (not sent, no gateway)");
                debug!(body = %mail.body);
                Ok(())
            }
            Mailer::Http {
                client,
                url,
                api_key,
                from,
            } => {
                let mut request = client.post(url).json(&json!({
                    "from": from,
                    "to": mail.to,
                    "subject": mail.subject,
                    "text": mail.body,
                }));
                if let Some(key) = api_key {
                    request = request.bearer_auth(key);
                }
                request
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|e| AppError::Mail(e.to_string()))?;
                debug!(to = %mail.to, "mail sent");
                Ok(())
            }
            Mailer::Capture(outbox) => {
                outbox
                    .lock()
                    .map_err(|_| AppError::Mail("outbox poisoned".into()))?
                    .push(mail);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_is_optional() {
        let log = Mailer::from_config(&MailConfig {
            api_url: None,
            api_key: None,
            from: "office@localhost".into(),
        })
        .unwrap();
        assert!(matches!(log, Mailer::Log { .. }));

        let http = Mailer::from_config(&MailConfig {
            api_url: Some("https://mail.example.org/send".into()),
            api_key: Some("k".into()),
            from: "office@localhost".into(),
        })
        .unwrap();
        assert!(matches!(http, Mailer::Http { .. }));
    }

    #[tokio::test]
    async fn silent_gateway_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mailer = Mailer::http(
            &format!("http://{addr}/send"),
            None,
            "office@localhost",
            Duration::from_millis(200),
        )
        .unwrap();
        let sent = tokio::time::timeout(
            Duration::from_secs(5),
            mailer.send(Mail {
                to: "ruth@example.org".into(),
                subject: "Hello".into(),
                body: "Body".into(),
            }),
        )
        .await
        .expect("send should give up on its own");
        assert!(matches!(sent, Err(AppError::Mail(_))));
    }

    #[tokio::test]
    async fn capture_keeps_messages() {
        let (mailer, outbox) = Mailer::capture();
        mailer
            .send(Mail {
                to: "ruth@example.org".into(),
                subject: "Hello".into(),
                body: "Body".into(),
            })
            .await
            .unwrap();
        assert_eq!(outbox.lock().unwrap().len(), 1);
    }
}
