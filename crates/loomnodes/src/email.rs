use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use loomcore::{Node, NodeContext, NodeError, NodeOutput, NodeSchema, Value};
use rand::Rng;
use std::path::Path;
use std::time::Duration;

/// Sends a plain-text email over SMTP
#[derive(Default)]
pub struct EmailNode;

#[async_trait]
impl Node for EmailNode {
    fn schema() -> NodeSchema {
        NodeSchema::new("email", "Email", "Sends emails via SMTP", "Output")
            .with_icon("📧")
            .input_with_default("subject", "string", "Email subject", "No Subject")
            .input("body", "string", "Email body", true)
            .input("attachments", "list", "List of file paths to attach", false)
            .output("sent", "boolean", "Whether email was sent")
            .output("message_id", "string", "Message ID")
            .property("smtp_server", "string", "SMTP Server", "SMTP server hostname", "smtp.gmail.com", true)
            .property("smtp_port", "number", "SMTP Port", "SMTP server port", 587.0, false)
            .property("username", "string", "Username", "SMTP username/email", "", true)
            .property("password", "string", "Password", "SMTP password/app password", "", true)
            .property("to_email", "string", "To Email", "Recipient email address", "", true)
            .property("from_name", "string", "From Name", "Sender display name", "", false)
            .property("use_tls", "boolean", "Use TLS", "Use TLS encryption", true, false)
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let body = ctx.require_input("body")?.to_string();
        let username = ctx.property_str("username", "");
        let password = ctx.property_str("password", "");
        let to_email = ctx.property_str("to_email", "");
        if username.is_empty() || password.is_empty() || to_email.is_empty() || body.is_empty() {
            return Err(NodeError::Configuration(
                "Username, password, to_email, and body are required".to_string(),
            ));
        }

        let mut attachments = Vec::new();
        if let Some(Value::Array(paths)) = ctx.input("attachments") {
            for path in paths {
                let path = path.to_string();
                match tokio::fs::read(&path).await {
                    Ok(bytes) => attachments.push((file_name(&path), bytes)),
                    Err(e) => ctx.events.warn(format!("Skipping attachment {}: {}", path, e)),
                }
            }
        }

        let envelope = Envelope {
            from_name: ctx.property_str("from_name", ""),
            username: username.clone(),
            to_email,
            subject: ctx.input_or("subject", Value::from("No Subject")).to_string(),
            body,
        };
        let message_id = new_message_id(&envelope.username);
        let message = envelope.build(&message_id, attachments)?;

        let server = ctx.property_str("smtp_server", "smtp.gmail.com");
        let port = ctx.property_f64("smtp_port", 587.0) as u16;
        let builder = if ctx.property_bool("use_tls", true) {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server)
                .map_err(|e| NodeError::Configuration(format!("Invalid SMTP server: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&server)
        };
        let transport = builder
            .port(port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(Duration::from_secs(30)))
            .build();

        ctx.events.info(format!("Sending email via {}:{}", server, port));
        transport
            .send(message)
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to send email: {}", e)))?;

        Ok(NodeOutput::new()
            .with_output("sent", true)
            .with_output("message_id", message_id))
    }
}

struct Envelope {
    from_name: String,
    username: String,
    to_email: String,
    subject: String,
    body: String,
}

impl Envelope {
    fn build(self, message_id: &str, attachments: Vec<(String, Vec<u8>)>) -> Result<Message, NodeError> {
        let sender: Address = self
            .username
            .parse()
            .map_err(|e| NodeError::Configuration(format!("Invalid sender address: {}", e)))?;
        let from = Mailbox::new(
            Some(self.from_name).filter(|n| !n.is_empty()),
            sender,
        );
        let to: Mailbox = self
            .to_email
            .parse()
            .map_err(|e| NodeError::Configuration(format!("Invalid recipient address: {}", e)))?;

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(self.body));
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| NodeError::ExecutionFailed(e.to_string()))?;
        for (name, bytes) in attachments {
            parts = parts.singlepart(Attachment::new(name).body(bytes, octet_stream.clone()));
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject)
            .message_id(Some(message_id.to_string()))
            .multipart(parts)
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to build email: {}", e)))
    }
}

fn new_message_id(sender: &str) -> String {
    let domain = sender.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost");
    format!(
        "<{}.{:08x}@{}>",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::rng().random::<u32>(),
        domain
    )
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
