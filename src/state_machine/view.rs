//! Messages shown to the user during a session

use super::event::{ActionId, ViewAction};
use super::state::{SessionContext, CANCEL_KEYWORD};
use crate::chat::{Button, ButtonStyle, OutboundMessage};
use crate::commit::CommitKind;
use crate::store::StagingRow;

pub const EXPIRED_INTERACTION: &str = "インタラクションが期限切れです。もう一度試してください。";
pub const NOT_INITIATOR: &str = "この記帳は開始した人だけが操作できます。";
pub const STAGING_BUSY: &str = "別の記帳が進行中です。完了してからもう一度試してください。";
pub const CANCELLED: &str = "記帳をキャンセルしました。";

/// `12000` -> `12,000`
pub fn group_thousands(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn purpose_prompt(ctx: &SessionContext) -> String {
    format!(
        "{} さん、どのような用途で使用しましたか？（やめる場合は「{CANCEL_KEYWORD}」）",
        ctx.initiator_name
    )
}

pub fn amount_edit_prompt() -> String {
    format!("修正後の金額を入力してください。（やめる場合は「{CANCEL_KEYWORD}」）")
}

pub fn purpose_edit_prompt() -> String {
    format!("修正後の内容を入力してください。（やめる場合は「{CANCEL_KEYWORD}」）")
}

pub fn malformed_amount(raw: &str) -> String {
    format!("金額「{raw}」を数値として読み取れませんでした。{}", amount_edit_prompt())
}

pub fn commit_failed(message: &str, retryable: bool) -> String {
    if retryable {
        format!("記帳に失敗しました（{message}）。もう一度ボタンを押してください。")
    } else {
        format!("記帳に失敗しました（{message}）。内容を確認してもう一度試してください。")
    }
}

pub fn store_failed(message: &str) -> String {
    format!("スプレッドシートを更新できませんでした（{message}）。記帳を中断しました。")
}

/// The confirmation view was rejected by the chat service
pub fn view_failed(message: &str) -> String {
    format!("確認画面を表示できませんでした（{message}）。内容を短くして入力し直してください。（やめる場合は「{CANCEL_KEYWORD}」）")
}

pub fn retracted(transaction_id: &str) -> String {
    format!("記帳を取り消しました。（{transaction_id}）")
}

pub fn retract_not_found(transaction_id: &str) -> String {
    format!("取り消す記帳が見つかりませんでした。（{transaction_id}）")
}

/// Confirmation view for `row`, its buttons bound to `generation`
pub fn confirmation(ctx: &SessionContext, row: &StagingRow, generation: u32) -> OutboundMessage {
    let button = |label: &str, style: ButtonStyle, action: ViewAction| {
        Button::action(
            label,
            style,
            ActionId::view(&ctx.session_id, generation, action).encode(),
        )
    };

    OutboundMessage::text(format!(
        "確認してください！\n名前: {}\n金額: 【 {} 】\n内容: {}",
        row.name,
        group_thousands(row.amount),
        row.purpose
    ))
    .with_button(button("金額を修正", ButtonStyle::Secondary, ViewAction::EditAmount))
    .with_button(button("内容を修正", ButtonStyle::Secondary, ViewAction::EditPurpose))
    .with_button(button(
        "記帳",
        ButtonStyle::Primary,
        ViewAction::Commit(CommitKind::OneRow),
    ))
    .with_button(button(
        "全額記帳",
        ButtonStyle::Danger,
        ViewAction::Commit(CommitKind::AllRows),
    ))
}

/// Success message with a link to the sheet and the retraction button
pub fn committed(ctx: &SessionContext, kind: CommitKind, transaction_id: &str) -> OutboundMessage {
    let text = match kind {
        CommitKind::OneRow => "記帳しました！",
        CommitKind::AllRows => "全額記帳しました！",
    };
    OutboundMessage::text(text)
        .with_button(Button::link("スプレッドシートを開く", &ctx.sheet_url))
        .with_button(Button::action(
            "取り消す",
            ButtonStyle::Danger,
            ActionId::retract(ctx.channel.clone(), transaction_id).encode(),
        ))
}
