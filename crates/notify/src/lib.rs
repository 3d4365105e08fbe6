//! PatchScout Notify - event subscribers
//!
//! Both collaborators implement [`patchscout_common::EventSink`] and are
//! handed to the scan runner at construction time:
//! - [`EventHub`]: broadcast channel behind the WebSocket endpoints
//! - [`EmailNotifier`]: SMTP alerts for severe findings and completed scans

mod email;
mod hub;

pub use email::{
    render_completion_report, render_vulnerability_alert, Email, EmailConfig, EmailNotifier,
    Mailer, NotifyError, SmtpMailer,
};
pub use hub::{EventHub, DEFAULT_CAPACITY};
