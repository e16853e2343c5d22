//! Action matcher: literal token and phrase matching over a message's text.

/// Words the bot answers with a greeting. Multi-word entries are only ever used as replies.
pub const GREETINGS: &[&str] = &[
    "hi",
    "bonjour",
    "hola",
    "hallo",
    "guten tag",
    "ciao",
    "olà",
    "ola",
    "namaste",
    "salaam",
    "zdras-tvuy-te",
    "ohayo",
    "konban wa",
    "konnichiwa",
    "ahn-young-ha-se-yo",
    "sain bainuu",
    "szia",
    "marhaba",
    "salama aleikum",
    "jambo",
    "ni hau",
    "nay hoh",
    "halo",
];

pub const SECURITY_TRIGGER: &str = "is internet on fire";
pub const REMINDER_TRIGGER: &str = "remind me to";

/// Something the bot can do in response to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Greet,
    SecurityCheck,
    ScheduleReminder,
}

/// Classify a message into actions. Greetings come first (one per matching token),
/// then the security check, then the reminder, regardless of where they appear in the text.
pub fn classify(text: &str) -> Vec<Action> {
    let mut actions: Vec<Action> = text
        .split_whitespace()
        .filter(|word| GREETINGS.contains(word))
        .map(|_| Action::Greet)
        .collect();
    if text.contains(SECURITY_TRIGGER) {
        actions.push(Action::SecurityCheck);
    }
    if text.contains(REMINDER_TRIGGER) {
        actions.push(Action::ScheduleReminder);
    }
    log::trace!("classified {:?} as {:?}", text, actions);
    actions
}
