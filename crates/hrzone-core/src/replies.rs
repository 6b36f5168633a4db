//! Reply wording (Telegram HTML). Pure: no state, no I/O.

use crate::{
    dialogue::Reply,
    messaging::types::{InlineKeyboard, OutboundMessage, RESTART_CALLBACK},
    validation::{Field, InvalidInput},
    zones::{ZoneResult, ZONE_FRACTIONS},
};

pub const RESTART_BUTTON_LABEL: &str = "Start over";

const ZONE_LABELS: [&str; 5] = [
    "recovery",
    "fat burn",
    "aerobic",
    "anaerobic threshold",
    "maximum",
];

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render(reply: &Reply) -> OutboundMessage {
    match reply {
        Reply::Welcome => OutboundMessage::html(format!(
            "Hi! I'll help you work out your heart-rate training zones.\n\n{}",
            ASK_AGE
        )),
        Reply::Restarted => OutboundMessage::html("Calculation restarted! 🔄"),
        Reply::AskAge => OutboundMessage::html(ASK_AGE),
        Reply::AskRestingHr => OutboundMessage::html(
            "Great! Now enter your resting heart rate \
             (your morning pulse while fully at rest):",
        ),
        Reply::Invalid(e) => OutboundMessage::html(invalid_input(e)),
        Reply::Zones { result, .. } => OutboundMessage::html(zones_report(result)),
        Reply::OfferRestart => {
            OutboundMessage::html("Want to calculate again for another age or resting rate?")
                .with_keyboard(InlineKeyboard::single(
                    RESTART_BUTTON_LABEL,
                    RESTART_CALLBACK,
                ))
        }
        Reply::Cancelled => {
            OutboundMessage::html("Dialogue cancelled. Send /start to begin again.")
        }
        Reply::NotStarted => {
            OutboundMessage::html("Send /start to calculate your heart-rate zones.")
        }
        Reply::NothingToCancel => {
            OutboundMessage::html("Nothing to cancel. Send /start to begin.")
        }
    }
}

const ASK_AGE: &str = "Enter your age (in years):";

fn invalid_input(e: &InvalidInput) -> String {
    match e {
        InvalidInput::NotANumber { field: Field::Age } => {
            "Please enter your age as a number (for example, 35):".to_string()
        }
        InvalidInput::NotANumber {
            field: Field::RestingHeartRate,
        } => "Please enter your resting heart rate as a number (for example, 60):".to_string(),
        InvalidInput::OutOfRange {
            field: Field::Age,
            min,
            max,
        } => format!("Age must be between {min} and {max} years. Please enter a valid age:"),
        InvalidInput::OutOfRange {
            field: Field::RestingHeartRate,
            min,
            max,
        } => format!(
            "Resting heart rate is usually between {min} and {max} bpm.\n\
             Please enter a plausible value:"
        ),
    }
}

pub fn zones_report(result: &ZoneResult) -> String {
    let mut out = format!(
        "Your heart-rate zones:\n\nMax heart rate: <b>{}</b> bpm\n",
        result.max_heart_rate
    );
    for (idx, zone) in result.iter() {
        let i = usize::from(idx - 1);
        let low_pct = percent(ZONE_FRACTIONS[i]);
        let high_pct = ZONE_FRACTIONS.get(i + 1).map_or(100, |f| percent(*f));
        out.push_str(&format!(
            "\nZone {idx} ({low_pct}–{high_pct}%) — {}: <b>{} – {}</b>",
            escape_html(ZONE_LABELS[i]),
            zone.low,
            zone.high
        ));
    }
    out
}

fn percent(fraction: f64) -> u32 {
    (fraction * 100.0).round() as u32
}
