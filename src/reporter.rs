use std::fmt::Write;

use chrono::{DateTime, TimeZone};

use crate::types::StarGift;

/// Render the operator notification for a catalog.
///
/// Lists every gift that still has stock. Returns `None` when nothing is in
/// stock, in which case no message should be sent.
pub fn format_update_message<Tz>(gifts: &[StarGift], now: &DateTime<Tz>) -> Option<String>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let available: Vec<&StarGift> = gifts
        .iter()
        .filter(|g| g.availability_remains > 0)
        .collect();
    if available.is_empty() {
        return None;
    }

    let mut message = String::from("✅ <b>Available Limited Gifts:</b>\n");
    for gift in available {
        let _ = write!(
            message,
            "🎁 Gift {}\n⭐ Stars: {}\n📦 Available: {}/{}\n\n",
            gift.id, gift.stars, gift.availability_remains, gift.availability_total
        );
    }
    let _ = write!(message, "⏰ <i>Updated at: {}</i>", now.format("%H:%M:%S"));
    Some(message)
}

/// Plain-text overview of all limited gifts, scarcest first.
pub fn limited_gifts_summary(gifts: &[StarGift]) -> String {
    let mut limited: Vec<&StarGift> = gifts.iter().filter(|g| g.is_limited()).collect();
    limited.sort_by_key(|g| g.availability_total);

    let mut out = String::from("Limited gifts info:\n");
    for gift in limited {
        let _ = writeln!(
            out,
            "Gift {}: {}/{}",
            gift.id, gift.availability_remains, gift.availability_total
        );
    }
    out
}

/// Print the limited-gift overview to stdout.
pub fn report_summary(gifts: &[StarGift]) {
    print!("{}", limited_gifts_summary(gifts));
}
