pub mod factory;
pub mod ingest;
pub mod interface;
pub mod parser;
pub mod providers;

pub use factory::{
    build_mailbox, resolve_backend_kind, supported_backend_keys, MailBackendSettings,
    MailboxFactoryOutput,
};
pub use ingest::{IngestLine, IngestOutcome, IngestReport, MailIngester};
pub use interface::{MailBackendError, MailBackendKind, MailQuery, Mailbox, RawMail};
pub use parser::{parse_mail, ContractorMessage, ParseError};
pub use providers::desktop::DesktopExportMailbox;
pub use providers::fake::FakeMailbox;
pub use providers::graph::{GraphMailbox, GraphMailboxConfig};
