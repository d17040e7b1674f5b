use chrono::{DateTime, FixedOffset, Utc};
use lettre::message::Mailbox;

use crate::email::OutboundMessage;
use crate::html;
use crate::validators::{ContactFields, InquiryFields, ValidatedFields};

const KOLKATA_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Current time in Asia/Kolkata, the zone submission timestamps are reported in.
pub fn kolkata_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(KOLKATA_OFFSET_SECS).expect("UTC+05:30 is a valid offset");
    Utc::now().with_timezone(&offset)
}

fn format_submitted_at(submitted_at: &DateTime<FixedOffset>) -> String {
    submitted_at.format("%-d/%-m/%Y, %-I:%M:%S %P").to_string()
}

/// Builds the email for a validated submission. Replies go to the submitter.
pub fn compose(
    fields: &ValidatedFields,
    to: Mailbox,
    from: Mailbox,
    submitted_at: &DateTime<FixedOffset>,
) -> OutboundMessage {
    let submitted_at = format_submitted_at(submitted_at);

    let (subject, text, html) = match fields {
        ValidatedFields::Contact(f) => ContactMessage::generate(f, &submitted_at),
        ValidatedFields::Inquiry(f) => InquiryMessage::generate(f, &submitted_at),
    };

    OutboundMessage {
        to,
        from,
        subject,
        text,
        html,
        reply_to: Some(Mailbox::new(
            Some(String::from(fields.submitter_name())),
            fields.submitter_email().clone(),
        )),
    }
}

pub struct ContactMessage {}
pub struct InquiryMessage {}

impl ContactMessage {
    /// Returns `(subject, text, html)`.
    pub fn generate(fields: &ContactFields, submitted_at: &str) -> (String, String, String) {
        let subject = format!("Contact Form — {}", fields.name());

        let text = format!(
            "Contact message from {}\n\n{}\n\nPhone: {}\nEmail: {}\nSubmitted at: {}",
            fields.name(),
            fields.message(),
            fields.phone(),
            fields.email(),
            submitted_at,
        );

        let html = format!(
            "<div style=\"font-family: Arial, Helvetica, sans-serif; color: #222;\">
               <h2>New Contact Form Message</h2>
               <p><strong>Name:</strong> {}</p>
               <p><strong>Email:</strong> {}</p>
               <p><strong>Phone:</strong> {}</p>
               <p><strong>Message:</strong><br/>{}</p>
               <p style=\"color:#666;font-size:12px;\">Submitted at: {} (Asia/Kolkata)</p>
             </div>",
            html::escape(fields.name()),
            html::escape(&fields.email().to_string()),
            html::escape(fields.phone()),
            html::escape_multiline(fields.message()),
            submitted_at,
        );

        (subject, text, html)
    }
}

impl InquiryMessage {
    /// Returns `(subject, text, html)`. The description is left out of both bodies when
    /// the submitter did not provide one.
    pub fn generate(fields: &InquiryFields, submitted_at: &str) -> (String, String, String) {
        let subject = format!("New Project Inquiry — {}", fields.full_name());

        let text_description = match fields.description() {
            Some(d) => format!("Description:\n{d}\n\n"),
            None => String::new(),
        };

        let text = format!(
            "New Project Inquiry\n\nFull Name: {}\nEmail: {}\nPhone: {}\nProject Type: {}\n\
             Budget: {}\n\n{}Submitted at: {}",
            fields.full_name(),
            fields.email(),
            fields.phone(),
            fields.project_type(),
            fields.budget(),
            text_description,
            submitted_at,
        );

        let html_description = match fields.description() {
            Some(d) => format!(
                "<p><strong>Project Description:</strong><br/>{}</p>",
                html::escape_multiline(d),
            ),
            None => String::new(),
        };

        let html = format!(
            "<div style=\"font-family: Arial, Helvetica, sans-serif; color:#222;\">
               <h2>New Project Inquiry</h2>
               <p><strong>Full Name:</strong> {}</p>
               <p><strong>Email:</strong> {}</p>
               <p><strong>Phone:</strong> {}</p>
               <p><strong>Project Type:</strong> {}</p>
               <p><strong>Estimated Budget:</strong> {}</p>
               {}
               <p style=\"color:#666;font-size:12px;\">Submitted at: {} (Asia/Kolkata)</p>
             </div>",
            html::escape(fields.full_name()),
            html::escape(&fields.email().to_string()),
            html::escape(fields.phone()),
            html::escape(fields.project_type()),
            html::escape(fields.budget()),
            html_description,
            submitted_at,
        );

        (subject, text, html)
    }
}
