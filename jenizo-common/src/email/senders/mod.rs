mod mock_sender;
mod sandbox;
mod sendgrid;
mod smtp;

pub use mock_sender::MockSender;
pub use sandbox::SandboxSender;
pub use sendgrid::SendGridSender;
pub use smtp::SmtpSender;

use uuid::Uuid;

fn generate_message_id(domain: &str) -> String {
    format!("<{}@{}>", Uuid::new_v4(), domain)
}
