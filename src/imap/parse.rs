/// Raw message → normalized record
use chrono::{DateTime, Utc};
use mail_parser::{Addr, Address, MessageParser};

use crate::models::message::{NO_SUBJECT, UNKNOWN_ADDRESS};
use crate::models::{Account, NormalizedMessage, RawMessage};

/// Never fails: anything the parser cannot make sense of becomes a placeholder.
pub fn normalize(raw: &RawMessage, account: &Account, folder: &str) -> NormalizedMessage {
    normalize_at(raw, account.id(), folder, Utc::now())
}

/// As `normalize`, with the wall-clock fallback for a missing date supplied.
pub fn normalize_at(
    raw: &RawMessage,
    account_id: &str,
    folder: &str,
    now: DateTime<Utc>,
) -> NormalizedMessage {
    let parsed = MessageParser::default().parse(raw.source.as_slice());

    let subject = parsed
        .as_ref()
        .and_then(|m| m.subject())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let body = parsed
        .as_ref()
        .and_then(|m| m.body_text(0))
        .map(|b| b.trim_end().to_string())
        .unwrap_or_default();

    let from = parsed
        .as_ref()
        .and_then(|m| m.from())
        .and_then(format_address)
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

    let to = parsed
        .as_ref()
        .and_then(|m| m.to())
        .and_then(format_address)
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

    let received_at = parsed
        .as_ref()
        .and_then(|m| m.date())
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or(raw.internal_date)
        .unwrap_or(now);

    NormalizedMessage {
        subject,
        body,
        from,
        to,
        received_at: whole_seconds(received_at),
        account_id: account_id.to_string(),
        folder: folder.to_string(),
    }
}

/// Drops sub-second precision so stored timestamps round trip exactly.
pub fn whole_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

fn format_address(address: &Address) -> Option<String> {
    let rendered: Vec<String> = match address {
        Address::List(list) => list.iter().filter_map(format_addr).collect(),
        Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .filter_map(format_addr)
            .collect(),
    };
    if rendered.is_empty() {
        None
    } else {
        Some(rendered.join(", "))
    }
}

fn format_addr(addr: &Addr) -> Option<String> {
    let name = addr.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let email = addr.address.as_deref().map(str::trim).filter(|a| !a.is_empty());
    match (name, email) {
        (Some(n), Some(a)) => Some(format!("{n} <{a}>")),
        (None, Some(a)) => Some(a.to_string()),
        (Some(n), None) => Some(n.to_string()),
        (None, None) => None,
    }
}
