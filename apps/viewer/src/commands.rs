//! Commands typed at the prompt, standing in for the page's buttons.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    SignIn,
    SignOut,
    Show,
    Help,
    Quit,
}

impl UiCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "sign-in" | "signin" | "in" => Some(Self::SignIn),
            "sign-out" | "signout" | "out" => Some(Self::SignOut),
            "show" | "" => Some(Self::Show),
            "help" | "?" => Some(Self::Help),
            "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignOut => "sign_out",
            Self::Show => "show",
            Self::Help => "help",
            Self::Quit => "quit",
        }
    }
}

pub const HELP: &str = "commands: sign-in, sign-out, show, help, quit";
