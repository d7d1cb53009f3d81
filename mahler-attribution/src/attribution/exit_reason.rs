//! Exit reason resolution.
//!
//! Structured reason types are preferred. Older trade logs only carry a
//! free-text reason in English or Chinese, so a fixed ordered keyword table
//! maps those onto [`ExitReasonType`]. The table is a compatibility shim:
//! new producers should set the structured type instead of adding keywords.

use crate::data::ExitReasonType;

/// Ordered keyword rules, first match wins. Keywords are lower case.
///
/// The DTE/time-exit rule sits before the expiry rule because "临近到期"
/// contains "到期".
const KEYWORD_RULES: &[(&[&str], ExitReasonType)] = &[
    (
        &["stop loss", "stop_loss", "stop-loss", "stoploss", "止损"],
        ExitReasonType::StopLoss,
    ),
    (
        &[
            "take profit",
            "take_profit",
            "profit target",
            "profit_target",
            "止盈",
        ],
        ExitReasonType::ProfitTarget,
    ),
    (
        &["dte", "time exit", "time_exit", "临近到期"],
        ExitReasonType::TimeExit,
    ),
    (
        &["expire", "expiry", "expiration", "到期"],
        ExitReasonType::Expired,
    ),
    (
        &["risk", "margin", "风控", "保证金"],
        ExitReasonType::RiskLimit,
    ),
    (&["roll", "移仓", "展期"], ExitReasonType::Rolled),
    (&["manual", "手动"], ExitReasonType::Manual),
    (
        &["end of backtest", "end_of_backtest", "回测结束"],
        ExitReasonType::EndOfPeriod,
    ),
];

/// Map a free-text reason onto a reason type by keyword.
pub fn legacy_reason_type(reason: &str) -> ExitReasonType {
    let lowered = reason.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, reason_type)| *reason_type)
        .unwrap_or(ExitReasonType::Other)
}

/// Resolve a trade's exit reason: structured tag, then keywords, else `None`
/// when there is nothing to go on.
pub fn resolve(
    reason_type: Option<ExitReasonType>,
    reason: Option<&str>,
) -> Option<ExitReasonType> {
    reason_type.or_else(|| {
        reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(legacy_reason_type)
    })
}

/// Slice/breakdown token for an exit reason, `"UNKNOWN"` when unresolved.
pub fn normalize_reason_token(
    reason_type: Option<ExitReasonType>,
    reason: Option<&str>,
) -> String {
    resolve(reason_type, reason)
        .map(|r| r.token().to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

/// Breakdown token from the free-text reason itself, so variants of one
/// reason type stay apart. Falls back to the resolved type token.
pub fn reason_text_token(reason_type: Option<ExitReasonType>, reason: Option<&str>) -> String {
    let text = reason.map(str::trim).filter(|r| !r.is_empty());
    let Some(text) = text else {
        return normalize_reason_token(reason_type, None);
    };

    let mut token = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            token.extend(c.to_uppercase());
        } else if !token.ends_with('_') {
            token.push('_');
        }
    }
    token.trim_matches('_').to_string()
}

pub fn is_stop_loss(reason_type: Option<ExitReasonType>, reason: Option<&str>) -> bool {
    resolve(reason_type, reason) == Some(ExitReasonType::StopLoss)
}
