use gopherbot_core::config::BotMode;

/// Claims an unowned bot in privileged mode. Matched exactly, not lower-cased.
pub const INIT_COMMAND: &str = "_INIT";
/// Postback payload carried by the "more gophers" button.
pub const GOPHER_PAYLOAD: &str = "_GOPHER";

const GOPHER_KEYWORDS: [&str; 3] = ["gopher", "go", "golang"];
const PYTHON_KEYWORDS: [&str; 1] = ["python"];
const JAVA_KEYWORDS: [&str; 1] = ["java"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Init,
    Gopher,
    Python,
    Java,
    Unmatched,
}

/// First match wins, in the order init, go-family, python, java.
pub fn classify(text: &str, mode: BotMode) -> Intent {
    if mode == BotMode::Privileged && text.trim() == INIT_COMMAND {
        return Intent::Init;
    }

    let lowered = text.to_lowercase();
    if contains_any(&lowered, &GOPHER_KEYWORDS) {
        Intent::Gopher
    } else if contains_any(&lowered, &PYTHON_KEYWORDS) {
        Intent::Python
    } else if contains_any(&lowered, &JAVA_KEYWORDS) {
        Intent::Java
    } else {
        Intent::Unmatched
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
