//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::{Collaborators, SessionManager, SessionSettings};
use crate::chat::{
    ButtonTarget, ChannelId, ChatError, InboundInteraction, InboundMessage, MessageId,
    OutboundMessage, UserId,
};
use crate::commit::{CommitError, CommitKind, TransactionIdGenerator};
use crate::dispatcher::Dispatcher;
use crate::names::NameResolver;
use crate::state_machine::{ActionId, ViewAction};
use crate::store::{
    CommittedRow, StagingField, StagingRow, StoreError, FIRST_COMMITTED_ROW,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-Memory Row Store
// ============================================================================

/// In-memory sheet: one staging row plus committed rows
#[allow(dead_code)]
#[derive(Default)]
pub struct InMemoryRowStore {
    /// Columns B-E of the staging row
    staging: Mutex<[String; 4]>,
    committed: Mutex<Vec<CommittedRow>>,
    fail_writes: AtomicBool,
    fail_clears: AtomicBool,
}

#[allow(dead_code)]
impl InMemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent clear fail, leaving staging as it was
    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Raw text of a staging cell
    pub fn cell(&self, field: StagingField) -> String {
        self.staging.lock().unwrap()[slot(field)].clone()
    }

    pub fn staging_is_blank(&self) -> bool {
        self.staging.lock().unwrap().iter().all(String::is_empty)
    }

    /// Append the staged entry as the finalize script would
    pub fn append_staged(&self) {
        let staging = self.staging.lock().unwrap().clone();
        let mut committed = self.committed.lock().unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let index = FIRST_COMMITTED_ROW + committed.len() as u32;
        let mut cells = vec![String::new()];
        cells.extend(staging);
        committed.push(CommittedRow { index, cells });
    }

    pub fn committed_rows(&self) -> Vec<CommittedRow> {
        self.committed.lock().unwrap().clone()
    }
}

fn slot(field: StagingField) -> usize {
    match field {
        StagingField::Name => 0,
        StagingField::Amount => 1,
        StagingField::Purpose => 2,
        StagingField::TransactionId => 3,
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn write_field(&self, field: StagingField, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        self.staging.lock().unwrap()[slot(field)] = value.to_string();
        Ok(())
    }

    async fn read_staging(&self) -> Result<StagingRow, StoreError> {
        let cells = self.staging.lock().unwrap().clone();
        StagingRow::from_cells(&cells[0], &cells[1], &cells[2], &cells[3])
    }

    async fn clear_staging(&self) -> Result<(), StoreError> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(StoreError::Api {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        *self.staging.lock().unwrap() = Default::default();
        Ok(())
    }

    async fn scan_committed_rows(&self) -> Result<Vec<CommittedRow>, StoreError> {
        Ok(self.committed_rows())
    }

    async fn delete_row(&self, index: u32) -> Result<(), StoreError> {
        let mut committed = self.committed.lock().unwrap();
        let before = committed.len();
        committed.retain(|row| row.index != index);
        if committed.len() == before {
            return Err(StoreError::Api {
                status: 400,
                body: format!("no row {index}"),
            });
        }
        // Rows below move up, as in a sheet
        for row in committed.iter_mut().filter(|row| row.index > index) {
            row.index -= 1;
        }
        Ok(())
    }
}

// ============================================================================
// Mock Chat Client
// ============================================================================

/// Records every message posted and deleted
#[allow(dead_code)]
#[derive(Default)]
pub struct MockChatClient {
    next_id: AtomicU64,
    sent: Mutex<Vec<(ChannelId, MessageId, OutboundMessage)>>,
    deleted: Mutex<Vec<MessageId>>,
    unknown_channels: Mutex<HashSet<ChannelId>>,
    /// Longest accepted content in characters; zero means unlimited
    max_len: AtomicUsize,
}

#[allow(dead_code)]
impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forget_channel(&self, channel: &ChannelId) {
        self.unknown_channels.lock().unwrap().insert(channel.clone());
    }

    /// Reject longer messages the way the chat API does
    pub fn limit_length(&self, chars: usize) {
        self.max_len.store(chars, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ChannelId, MessageId, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|(_, _, m)| m.content)
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn any_text_contains(&self, needle: &str) -> bool {
        self.sent_texts().iter().any(|t| t.contains(needle))
    }

    /// Latest confirmation view: its message id and content
    pub fn last_view(&self) -> Option<(MessageId, OutboundMessage)> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(_, _, m)| {
                m.buttons.iter().any(|b| {
                    matches!(&b.target, ButtonTarget::Custom { custom_id }
                        if matches!(ActionId::parse(custom_id), Some(ActionId::View { .. })))
                })
            })
            .map(|(_, id, m)| (id, m))
    }

    /// Custom id of `action` on the latest confirmation view
    pub fn view_button(&self, action: ViewAction) -> Option<String> {
        let (_, view) = self.last_view()?;
        view.buttons.into_iter().find_map(|b| match b.target {
            ButtonTarget::Custom { custom_id } => match ActionId::parse(&custom_id) {
                Some(ActionId::View { action: a, .. }) if a == action => Some(custom_id),
                _ => None,
            },
            ButtonTarget::Link { .. } => None,
        })
    }

    /// Custom id of the latest retraction button
    pub fn retract_button(&self) -> Option<String> {
        self.sent().into_iter().rev().find_map(|(_, _, m)| {
            m.buttons.into_iter().find_map(|b| match b.target {
                ButtonTarget::Custom { custom_id }
                    if matches!(ActionId::parse(&custom_id), Some(ActionId::Retract { .. })) =>
                {
                    Some(custom_id)
                }
                _ => None,
            })
        })
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn send_message(
        &self,
        channel: &ChannelId,
        message: &OutboundMessage,
    ) -> Result<MessageId, ChatError> {
        if self.unknown_channels.lock().unwrap().contains(channel) {
            return Err(ChatError::UnknownChannel(channel.clone()));
        }
        let max_len = self.max_len.load(Ordering::SeqCst);
        if max_len > 0 && message.content.chars().count() > max_len {
            return Err(ChatError::Api {
                status: 400,
                body: "content too long".to_string(),
            });
        }
        let id = MessageId::new(format!("m{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.sent
            .lock()
            .unwrap()
            .push((channel.clone(), id.clone(), message.clone()));
        Ok(id)
    }

    async fn delete_message(&self, _channel: &ChannelId, message: &MessageId) -> Result<(), ChatError> {
        self.deleted.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Mock Commit Gateway
// ============================================================================

/// Finalize script stand-in that appends the staged row to the store
#[allow(dead_code)]
pub struct MockCommitGateway {
    store: Arc<InMemoryRowStore>,
    failures_remaining: AtomicUsize,
    /// (kind, staging tag at the moment of the call)
    pub calls: Mutex<Vec<(CommitKind, String)>>,
}

#[allow(dead_code)]
impl MockCommitGateway {
    pub fn new(store: Arc<InMemoryRowStore>) -> Self {
        Self {
            store,
            failures_remaining: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `n` calls with a server error
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn recorded_calls(&self) -> Vec<(CommitKind, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitGateway for MockCommitGateway {
    async fn commit(&self, kind: CommitKind) -> Result<(), CommitError> {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CommitError::Status { status: 500 });
        }
        self.calls
            .lock()
            .unwrap()
            .push((kind, self.store.cell(StagingField::TransactionId)));
        self.store.append_staged();
        Ok(())
    }
}

// ============================================================================
// Test Ledger Builder
// ============================================================================

pub const TEST_CHANNEL: &str = "ledger-channel";
pub const TEST_BOT_ID: &str = "4242";

/// A `SessionManager` wired to in-memory collaborators
pub struct TestLedger {
    pub manager: Arc<SessionManager>,
    pub store: Arc<InMemoryRowStore>,
    pub chat: Arc<MockChatClient>,
    pub commit: Arc<MockCommitGateway>,
}

#[allow(dead_code)]
impl TestLedger {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut SessionSettings)) -> Self {
        let store = Arc::new(InMemoryRowStore::new());
        let chat = Arc::new(MockChatClient::new());
        let commit = Arc::new(MockCommitGateway::new(store.clone()));

        let mut settings = SessionSettings::new("https://sheet.example/edit#gid=0");
        configure(&mut settings);

        let io = Collaborators {
            store: store.clone(),
            chat: chat.clone(),
            commit: commit.clone(),
            ids: Arc::new(TransactionIdGenerator::new()),
        };
        let manager = Arc::new(SessionManager::new(
            io,
            settings,
            NameResolver::default(),
            Dispatcher::new("!", "memo", TEST_BOT_ID).unwrap(),
        ));

        Self {
            manager,
            store,
            chat,
            commit,
        }
    }

    pub async fn say(&self, user: &str, content: &str) -> super::MessageOutcome {
        self.manager
            .handle_message(InboundMessage {
                channel_id: ChannelId::new(TEST_CHANNEL),
                message_id: MessageId::new("in"),
                author_id: UserId::new(user),
                author_name: user.to_string(),
                content: content.to_string(),
            })
            .await
    }

    pub async fn press(&self, user: &str, custom_id: &str) -> super::InteractionOutcome {
        self.press_in(TEST_CHANNEL, user, custom_id).await
    }

    pub async fn press_in(
        &self,
        channel: &str,
        user: &str,
        custom_id: &str,
    ) -> super::InteractionOutcome {
        self.manager
            .handle_interaction(InboundInteraction {
                channel_id: ChannelId::new(channel),
                message_id: MessageId::new("view"),
                author_id: UserId::new(user),
                custom_id: custom_id.to_string(),
            })
            .await
    }

    /// Poll until `check` holds; sessions run on their own tasks
    pub async fn eventually(&self, mut check: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..200 {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check(self)
    }

    pub async fn idle(&self) -> bool {
        for _ in 0..200 {
            if self.manager.live_sessions().await == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    pub async fn wait_for_view(&self, count: usize) -> bool {
        self.eventually(|t| {
            t.chat
                .sent()
                .iter()
                .filter(|(_, _, m)| m.content.starts_with("確認してください"))
                .count()
                >= count
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{InteractionOutcome, MessageOutcome};
    use crate::state_machine::{view, CANCEL_KEYWORD};

    async fn start_and_describe(ledger: &TestLedger, user: &str, amount: &str, purpose: &str) {
        let outcome = ledger.say(user, &format!("!memo {amount}")).await;
        assert!(matches!(outcome, MessageOutcome::Started { .. }), "{outcome:?}");
        assert!(ledger.eventually(|t| t.chat.any_text_contains("どのような用途")).await);
        let outcome = ledger.say(user, purpose).await;
        assert!(matches!(outcome, MessageOutcome::Routed { .. }), "{outcome:?}");
    }

    #[tokio::test]
    async fn test_in_memory_store_delete_shifts_rows() {
        let store = InMemoryRowStore::new();
        store.write_field(StagingField::TransactionId, "a").await.unwrap();
        store.append_staged();
        store.write_field(StagingField::TransactionId, "b").await.unwrap();
        store.append_staged();

        store.delete_row(FIRST_COMMITTED_ROW).await.unwrap();
        let rows = store.committed_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index, FIRST_COMMITTED_ROW);
        assert_eq!(rows[0].tag(), "b");
    }

    #[tokio::test]
    async fn test_commit_one_happy_path() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "ちょい", "12000", "ランチ").await;

        assert!(ledger.wait_for_view(1).await);
        assert_eq!(ledger.store.cell(StagingField::Name), "ちゃい");
        assert_eq!(ledger.store.cell(StagingField::Amount), "12000");
        assert_eq!(ledger.store.cell(StagingField::Purpose), "ランチ");
        let (view_id, view) = ledger.chat.last_view().unwrap();
        assert!(view.content.contains("【 12,000 】"));

        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        assert!(matches!(
            ledger.press("ちょい", &commit).await,
            InteractionOutcome::Routed { .. }
        ));
        assert!(ledger.idle().await);

        let calls = ledger.commit.recorded_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, CommitKind::OneRow);
        // The tag was in staging when the script ran
        assert!(!calls[0].1.is_empty());
        assert_eq!(ledger.store.cell(StagingField::TransactionId), calls[0].1);

        assert!(ledger.chat.deleted().contains(&view_id));
        assert!(ledger.chat.any_text_contains("記帳しました！"));
        assert!(ledger.chat.retract_button().is_some());
    }

    #[tokio::test]
    async fn test_commit_all_uses_all_rows_action() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "300", "coffee").await;
        assert!(ledger.wait_for_view(1).await);

        let commit_all = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::AllRows))
            .unwrap();
        ledger.press("alice", &commit_all).await;
        assert!(ledger.idle().await);

        assert_eq!(ledger.commit.recorded_calls()[0].0, CommitKind::AllRows);
        assert!(ledger.chat.any_text_contains("全額記帳しました！"));
    }

    #[tokio::test]
    async fn test_cancel_at_purpose_clears_staging() {
        let ledger = TestLedger::new();
        ledger.say("alice", "!memo 500").await;
        assert!(ledger.eventually(|t| t.store.cell(StagingField::Amount) == "500").await);

        ledger.say("alice", CANCEL_KEYWORD).await;
        assert!(ledger.idle().await);
        assert!(ledger.store.staging_is_blank());
        assert!(ledger.chat.any_text_contains(view::CANCELLED));
        assert!(ledger.commit.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_confirmation() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        ledger.say("alice", CANCEL_KEYWORD).await;
        assert!(ledger.idle().await);
        assert!(ledger.store.staging_is_blank());

        // The old view is dead now
        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        assert_eq!(ledger.press("alice", &commit).await, InteractionOutcome::Expired);
        assert!(ledger.chat.any_text_contains(view::EXPIRED_INTERACTION));
    }

    #[tokio::test]
    async fn test_failed_cancel_reports_instead_of_acknowledging() {
        let ledger = TestLedger::new();
        ledger.store.fail_clears(true);
        ledger.say("alice", "!memo 500").await;
        assert!(ledger.eventually(|t| t.store.cell(StagingField::Amount) == "500").await);

        ledger.say("alice", CANCEL_KEYWORD).await;
        assert!(ledger.idle().await);
        // Staging is still populated and the user is told so
        assert_eq!(ledger.store.cell(StagingField::Amount), "500");
        assert!(ledger.chat.any_text_contains("スプレッドシートを更新できませんでした"));
        assert!(!ledger.chat.any_text_contains(view::CANCELLED));

        ledger.store.fail_clears(false);
        assert!(matches!(
            ledger.say("alice", "!memo 600").await,
            MessageOutcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn test_amount_edit_rerenders_and_stales_old_view() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        let edit = ledger.chat.view_button(ViewAction::EditAmount).unwrap();
        let stale_commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        ledger.press("alice", &edit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("修正後の金額")).await);

        ledger.say("alice", "5000").await;
        assert!(ledger.wait_for_view(2).await);
        let (_, view) = ledger.chat.last_view().unwrap();
        assert!(view.content.contains("【 5,000 】"));

        ledger.press("alice", &stale_commit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains(view::EXPIRED_INTERACTION)).await);
        assert!(ledger.commit.recorded_calls().is_empty());
        assert_eq!(ledger.manager.live_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_non_numeric_amount_edit_reprompts() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        let edit = ledger.chat.view_button(ViewAction::EditAmount).unwrap();
        ledger.press("alice", &edit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("修正後の金額")).await);

        ledger.say("alice", "千円").await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("数値として読み取れません")).await);
        // Raw text went to the cell as-is
        assert_eq!(ledger.store.cell(StagingField::Amount), "千円");

        ledger.say("alice", "1000").await;
        assert!(ledger.wait_for_view(2).await);
        assert!(ledger.chat.last_view().unwrap().1.content.contains("【 1,000 】"));
    }

    #[tokio::test]
    async fn test_purpose_edit() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "800", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        let edit = ledger.chat.view_button(ViewAction::EditPurpose).unwrap();
        ledger.press("alice", &edit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("修正後の内容")).await);
        ledger.say("alice", "bus").await;
        assert!(ledger.wait_for_view(2).await);
        assert!(ledger.chat.last_view().unwrap().1.content.contains("内容: bus"));
        assert_eq!(ledger.store.cell(StagingField::Purpose), "bus");
    }

    #[tokio::test]
    async fn test_second_trigger_is_busy_until_first_ends() {
        let ledger = TestLedger::new();
        ledger.say("alice", "!memo 500").await;
        assert!(ledger.eventually(|t| t.store.cell(StagingField::Amount) == "500").await);
        assert_eq!(ledger.say("bob", "!memo 900").await, MessageOutcome::Busy);
        assert!(ledger.chat.any_text_contains(view::STAGING_BUSY));
        // Bob's trigger did not touch staging
        assert_eq!(ledger.store.cell(StagingField::Amount), "500");

        ledger.say("alice", CANCEL_KEYWORD).await;
        assert!(ledger.idle().await);
        assert!(matches!(
            ledger.say("bob", "!memo 900").await,
            MessageOutcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn test_other_users_messages_not_consumed() {
        let ledger = TestLedger::new();
        ledger.say("alice", "!memo 500").await;
        assert_eq!(ledger.say("bob", "hello").await, MessageOutcome::PassThrough);
        assert_eq!(ledger.say("bob", CANCEL_KEYWORD).await, MessageOutcome::PassThrough);

        ledger.say("alice", "lunch").await;
        assert!(ledger.wait_for_view(1).await);
        assert_eq!(ledger.store.cell(StagingField::Purpose), "lunch");
    }

    #[tokio::test]
    async fn test_non_initiator_press_rejected() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        ledger.press("bob", &commit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains(view::NOT_INITIATOR)).await);
        assert!(ledger.commit.recorded_calls().is_empty());

        ledger.press("alice", &commit).await;
        assert!(ledger.idle().await);
        assert_eq!(ledger.commit.recorded_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_leaves_staging() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "700", "snacks").await;
        assert!(ledger.wait_for_view(1).await);
        let sent_before = ledger.chat.sent().len();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(ledger.idle().await);

        // Silent end, staging untouched
        assert_eq!(ledger.chat.sent().len(), sent_before);
        assert_eq!(ledger.store.cell(StagingField::Amount), "700");
        assert_eq!(ledger.store.cell(StagingField::Purpose), "snacks");

        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        assert_eq!(ledger.press("alice", &commit).await, InteractionOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_when_configured() {
        let ledger = TestLedger::with_settings(|s| s.clear_on_timeout = true);
        start_and_describe(&ledger, "alice", "700", "snacks").await;
        assert!(ledger.wait_for_view(1).await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(ledger.idle().await);
        assert!(ledger.store.staging_is_blank());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_timeout_clear_is_reported() {
        let ledger = TestLedger::with_settings(|s| s.clear_on_timeout = true);
        ledger.store.fail_clears(true);
        start_and_describe(&ledger, "alice", "700", "snacks").await;
        assert!(ledger.wait_for_view(1).await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(ledger.idle().await);
        assert_eq!(ledger.store.cell(StagingField::Amount), "700");
        assert!(ledger.chat.any_text_contains("スプレッドシートを更新できませんでした"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_window_restarts_on_rerender() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "700", "snacks").await;
        assert!(ledger.wait_for_view(1).await);

        tokio::time::sleep(Duration::from_secs(40)).await;
        let edit = ledger.chat.view_button(ViewAction::EditPurpose).unwrap();
        ledger.press("alice", &edit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("修正後の内容")).await);
        ledger.say("alice", "drinks").await;
        assert!(ledger.wait_for_view(2).await);

        // 70s after the first view, 30s after the second
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ledger.manager.live_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_view_asks_for_shorter_purpose() {
        let ledger = TestLedger::new();
        ledger.chat.limit_length(200);
        start_and_describe(&ledger, "alice", "500", &"x".repeat(300)).await;

        assert!(ledger.eventually(|t| t.chat.any_text_contains("確認画面を表示できませんでした")).await);
        assert!(ledger.chat.last_view().is_none());
        assert_eq!(ledger.manager.live_sessions().await, 1);

        ledger.say("alice", "taxi").await;
        assert!(ledger.wait_for_view(1).await);
        assert!(ledger.chat.last_view().unwrap().1.content.contains("内容: taxi"));
    }

    #[tokio::test]
    async fn test_commit_failure_is_retryable() {
        let ledger = TestLedger::new();
        ledger.commit.fail_next(1);
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);

        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        ledger.press("alice", &commit).await;
        assert!(ledger.eventually(|t| t.chat.any_text_contains("記帳に失敗しました")).await);
        assert!(ledger.wait_for_view(2).await);

        let retry = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        assert_ne!(retry, commit);
        ledger.press("alice", &retry).await;
        assert!(ledger.idle().await);
        assert_eq!(ledger.commit.recorded_calls().len(), 1);
        assert!(ledger.chat.any_text_contains("記帳しました！"));
    }

    #[tokio::test]
    async fn test_retraction_deletes_tagged_row_once() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);
        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        ledger.press("alice", &commit).await;
        assert!(ledger.idle().await);
        assert_eq!(ledger.store.committed_rows().len(), 1);

        let retract = ledger.chat.retract_button().unwrap();
        assert_eq!(
            ledger.press("alice", &retract).await,
            InteractionOutcome::Retracted {
                row: FIRST_COMMITTED_ROW
            }
        );
        assert!(ledger.store.committed_rows().is_empty());
        assert!(ledger.chat.any_text_contains("取り消しました"));

        assert_eq!(
            ledger.press("alice", &retract).await,
            InteractionOutcome::RetractNotFound
        );
        assert!(ledger.chat.any_text_contains("見つかりませんでした"));
    }

    #[tokio::test]
    async fn test_retraction_from_another_channel_ignored() {
        let ledger = TestLedger::new();
        start_and_describe(&ledger, "alice", "500", "taxi").await;
        assert!(ledger.wait_for_view(1).await);
        let commit = ledger
            .chat
            .view_button(ViewAction::Commit(CommitKind::OneRow))
            .unwrap();
        ledger.press("alice", &commit).await;
        assert!(ledger.idle().await);

        let retract = ledger.chat.retract_button().unwrap();
        let sent_before = ledger.chat.sent().len();
        assert_eq!(
            ledger.press_in("elsewhere", "alice", &retract).await,
            InteractionOutcome::Ignored
        );
        assert_eq!(ledger.store.committed_rows().len(), 1);
        assert_eq!(ledger.chat.sent().len(), sent_before);

        assert!(matches!(
            ledger.press("alice", &retract).await,
            InteractionOutcome::Retracted { .. }
        ));
        assert!(ledger.store.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_retraction_only_touches_matching_row() {
        let ledger = TestLedger::new();
        for (views, (user, amount)) in [("alice", "100"), ("bob", "200")].into_iter().enumerate() {
            start_and_describe(&ledger, user, amount, "misc").await;
            assert!(ledger.wait_for_view(views + 1).await);
            let commit = ledger
                .chat
                .view_button(ViewAction::Commit(CommitKind::OneRow))
                .unwrap();
            ledger.press(user, &commit).await;
            assert!(ledger.idle().await);
        }
        let tags: Vec<String> = ledger
            .commit
            .recorded_calls()
            .into_iter()
            .map(|(_, tag)| tag)
            .collect();
        assert_eq!(tags.len(), 2);
        assert_ne!(tags[0], tags[1]);

        let outcome = ledger.manager.retract(&ChannelId::new(TEST_CHANNEL), &tags[0]).await;
        assert_eq!(outcome, InteractionOutcome::Retracted { row: FIRST_COMMITTED_ROW });
        let rows = ledger.store.committed_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag(), tags[1]);
    }

    #[tokio::test]
    async fn test_store_failure_ends_session_and_releases_lease() {
        let ledger = TestLedger::new();
        ledger.store.fail_writes(true);
        ledger.say("alice", "!memo 500").await;
        assert!(ledger.idle().await);
        assert!(ledger.chat.any_text_contains("スプレッドシートを更新できませんでした"));
        // The prompt was never sent
        assert!(!ledger.chat.any_text_contains("どのような用途"));

        ledger.store.fail_writes(false);
        assert!(matches!(
            ledger.say("alice", "!memo 500").await,
            MessageOutcome::Started { .. }
        ));
    }

    #[tokio::test]
    async fn test_mention_trigger_and_invalid_command() {
        let ledger = TestLedger::new();
        assert_eq!(ledger.say("alice", "!memo lunch").await, MessageOutcome::InvalidAmount);
        assert!(ledger.chat.any_text_contains("使い方"));

        let outcome = ledger.say("alice", &format!("<@{TEST_BOT_ID}> 2500")).await;
        assert!(matches!(outcome, MessageOutcome::Started { .. }));
        assert!(ledger.eventually(|t| t.store.cell(StagingField::Amount) == "2500").await);
    }

    #[tokio::test]
    async fn test_unknown_custom_ids_ignored() {
        let ledger = TestLedger::new();
        assert_eq!(
            ledger.press("alice", "someone-elses-button").await,
            InteractionOutcome::Ignored
        );
        assert!(ledger.chat.sent().is_empty());
    }
}
