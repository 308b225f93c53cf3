use wilson_core::{WilsonError, WilsonResult};

/// Semantic bucket that decouples agents from concrete model names.
///
/// `Chat` is the universal fallback: any purpose without a registered
/// client resolves to the chat client (flagged as a fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Chat,
    Orchestration,
    Planning,
    Analysis,
    Code,
    Vision,
}

impl Purpose {
    pub const ALL: [Purpose; 6] = [
        Purpose::Chat,
        Purpose::Orchestration,
        Purpose::Planning,
        Purpose::Analysis,
        Purpose::Code,
        Purpose::Vision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::Chat => "chat",
            Purpose::Orchestration => "orchestration",
            Purpose::Planning => "planning",
            Purpose::Analysis => "analysis",
            Purpose::Code => "code",
            Purpose::Vision => "vision",
        }
    }

    pub fn parse(s: &str) -> WilsonResult<Self> {
        match s {
            "chat" => Ok(Purpose::Chat),
            "orchestration" => Ok(Purpose::Orchestration),
            "planning" => Ok(Purpose::Planning),
            "analysis" => Ok(Purpose::Analysis),
            "code" => Ok(Purpose::Code),
            "vision" => Ok(Purpose::Vision),
            other => Err(WilsonError::Config(format!("unknown purpose: {other}"))),
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = WilsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Purpose::parse(s)
    }
}
