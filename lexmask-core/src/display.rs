use crate::trial::TrialResult;

/// Three mutually exclusive feedback outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Correct,
    Incorrect,
    TimedOut,
}

impl Feedback {
    pub fn for_result(result: &TrialResult) -> Self {
        match (result.decision, result.is_correct()) {
            (None, _) => Feedback::TimedOut,
            (Some(_), true) => Feedback::Correct,
            (Some(_), false) => Feedback::Incorrect,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Feedback::Correct => "Correct!",
            Feedback::Incorrect => "Incorrect.",
            Feedback::TimedOut => "Too slow!",
        }
    }
}

/// Content for one screen. Styling belongs to the [`Display`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Blank,
    Fixation,
    Stimulus(String),
    Mask(String),
    Prompt { word_key: String, nonword_key: String },
    Feedback(Feedback),
    Message(String),
}

impl Screen {
    /// Text a plain renderer would put on screen.
    pub fn text(&self) -> String {
        match self {
            Screen::Blank => String::new(),
            Screen::Fixation => "+".to_string(),
            Screen::Stimulus(text) | Screen::Mask(text) | Screen::Message(text) => text.clone(),
            Screen::Prompt {
                word_key,
                nonword_key,
            } => format!(
                "{} = WORD    {} = NOT A WORD",
                word_key.to_uppercase(),
                nonword_key.to_uppercase()
            ),
            Screen::Feedback(feedback) => feedback.text().to_string(),
        }
    }
}

/// Rendering seam. `present` is called once per refresh opportunity with the
/// screen that should be visible on that frame.
pub trait Display: Send {
    fn present(&mut self, screen: &Screen);

    /// Whether the rendering target can be used. Checked once before a session.
    fn is_ready(&self) -> bool {
        true
    }
}
