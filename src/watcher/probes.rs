use anyhow::Result;
use std::sync::Arc;

use super::TerminationProbe;
use crate::browser::PageDriver;
use crate::session::StopReason;

/// Fires when the participant count shows only the bot
pub struct ParticipantCountProbe {
    page: Arc<dyn PageDriver>,
    locator: String,
}

impl ParticipantCountProbe {
    pub fn new(page: Arc<dyn PageDriver>, locator: impl Into<String>) -> Self {
        Self {
            page,
            locator: locator.into(),
        }
    }
}

#[async_trait::async_trait]
impl TerminationProbe for ParticipantCountProbe {
    fn name(&self) -> &str {
        "participant-count"
    }

    fn reason(&self) -> StopReason {
        StopReason::AloneInMeeting
    }

    async fn check(&self) -> Result<bool> {
        let Some(element) = self.page.query(&self.locator).await? else {
            return Ok(false);
        };
        let count = self.page.text_content(&element).await?;
        Ok(count.trim() == "1")
    }
}

/// Fires when the "you have been removed" heading appears
pub struct KickedProbe {
    page: Arc<dyn PageDriver>,
    locator: String,
}

impl KickedProbe {
    pub fn new(page: Arc<dyn PageDriver>, locator: impl Into<String>) -> Self {
        Self {
            page,
            locator: locator.into(),
        }
    }
}

#[async_trait::async_trait]
impl TerminationProbe for KickedProbe {
    fn name(&self) -> &str {
        "kicked"
    }

    fn reason(&self) -> StopReason {
        StopReason::Kicked
    }

    async fn check(&self) -> Result<bool> {
        Ok(self.page.query(&self.locator).await?.is_some())
    }
}
