use async_trait::async_trait;
use time::macros::datetime;

use crate::interface::{MailBackendError, MailBackendKind, MailQuery, Mailbox, RawMail};

const FAKE_SENDER: &str = "contractor@example.com";

/// Deterministic offline mailbox. The lookback window is ignored so the fixed
/// dataset stays visible regardless of the current date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeMailbox {
    messages: Vec<RawMail>,
}

impl FakeMailbox {
    pub fn contractor_dataset() -> Self {
        Self::with_messages(contractor_dataset())
    }

    pub fn with_messages(messages: Vec<RawMail>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[RawMail] {
        &self.messages
    }
}

impl Default for FakeMailbox {
    fn default() -> Self {
        Self::contractor_dataset()
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    fn kind(&self) -> MailBackendKind {
        MailBackendKind::Fake
    }

    async fn fetch(&self, query: &MailQuery) -> Result<Vec<RawMail>, MailBackendError> {
        let mut messages = self.messages.clone();
        messages.sort_by(|left, right| right.received_at.cmp(&left.received_at));
        messages.truncate(query.limit_usize());
        Ok(messages)
    }
}

fn contractor_dataset() -> Vec<RawMail> {
    vec![
        RawMail {
            subject: "Заявка 101: подрядчик выехал".to_owned(),
            body: "Заявка №101. Позиция 12. Подрядчик в пути, ожидаем прибытие через 30 минут."
                .to_owned(),
            sender: FAKE_SENDER.to_owned(),
            received_at: datetime!(2025-09-27 10:15:00 UTC),
        },
        RawMail {
            subject: "REQ-101 подрядчик на месте".to_owned(),
            body: "Подрядчик прибыл на позицию 12. Проверка оборудования.".to_owned(),
            sender: FAKE_SENDER.to_owned(),
            received_at: datetime!(2025-09-27 11:05:00 UTC),
        },
        RawMail {
            subject: "REQ-102 завершено".to_owned(),
            body: "Позиция 8. Работы выполнены, подрядчик убыл.".to_owned(),
            sender: FAKE_SENDER.to_owned(),
            received_at: datetime!(2025-09-27 12:40:00 UTC),
        },
    ]
}
