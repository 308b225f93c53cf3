use wilson_core::TaskType;
use wilson_llm::Purpose;

/// The six agent variants. A tagged enum plus a shared base record — no
/// inheritance tree; the base execute skeleton dispatches on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Chat,
    Code,
    Test,
    Research,
    Review,
    Analysis,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Chat,
        AgentKind::Code,
        AgentKind::Test,
        AgentKind::Research,
        AgentKind::Review,
        AgentKind::Analysis,
    ];

    pub fn default_name(self) -> &'static str {
        match self {
            AgentKind::Chat => "ChatAgent",
            AgentKind::Code => "CodeAgent",
            AgentKind::Test => "TestAgent",
            AgentKind::Research => "ResearchAgent",
            AgentKind::Review => "ReviewAgent",
            AgentKind::Analysis => "AnalysisAgent",
        }
    }

    /// LLM purpose this variant generates with.
    pub fn purpose(self) -> Purpose {
        match self {
            AgentKind::Chat => Purpose::Chat,
            AgentKind::Code | AgentKind::Test => Purpose::Code,
            AgentKind::Research | AgentKind::Review | AgentKind::Analysis => Purpose::Analysis,
        }
    }

    pub fn handles(self, task_type: TaskType) -> bool {
        matches!(
            (self, task_type),
            (AgentKind::Chat, TaskType::General)
                | (AgentKind::Code, TaskType::Code)
                | (AgentKind::Test, TaskType::Test)
                | (AgentKind::Research, TaskType::Research)
                | (AgentKind::Review, TaskType::Review)
                | (AgentKind::Analysis, TaskType::Analysis)
        )
    }

    /// Whether the first LLM turn must produce tool calls. Prose is the
    /// deliverable for the conversational/reading variants.
    pub fn requires_tool_calls(self) -> bool {
        matches!(self, AgentKind::Code | AgentKind::Test)
    }

    pub fn can_delegate(self) -> bool {
        matches!(self, AgentKind::Chat)
    }

    /// The review agent is read-only: no writing tool ever appears here.
    pub fn default_allowed_tools(self) -> Vec<String> {
        let tools: &[&str] = match self {
            AgentKind::Chat => &["read_file", "list_directory", "search_text"],
            AgentKind::Code => &[
                "read_file",
                "write_file",
                "generate_code",
                "modify_file",
                "edit_line",
                "list_directory",
                "create_directory",
                "compile_project",
                "lint_project",
                "search_text",
            ],
            AgentKind::Test => &[
                "read_file",
                "write_file",
                "generate_code",
                "compile_project",
                "run_tests",
                "list_directory",
                "search_text",
            ],
            AgentKind::Research => &["read_file", "list_directory", "search_text", "git_status"],
            AgentKind::Review => &["read_file", "list_directory", "search_text", "git_status"],
            AgentKind::Analysis => &[
                "read_file",
                "list_directory",
                "search_text",
                "compile_project",
                "lint_project",
                "git_status",
            ],
        };
        tools.iter().map(|s| (*s).to_string()).collect()
    }

    pub fn role_fragment(self) -> &'static str {
        match self {
            AgentKind::Chat => {
                "You are a general-purpose assistant for a local development workspace. \
                 Answer directly; use tools only when the answer requires reading the project."
            }
            AgentKind::Code => {
                "You are a code-writing agent. You implement the requested change by \
                 emitting tool calls — you never print code in your reply text. \
                 Create new files with generate_code, change existing files with \
                 edit_line or modify_file, and check your work with compile_project."
            }
            AgentKind::Test => {
                "You are a test-writing agent. You write tests for existing source \
                 files by emitting tool calls, then run them with run_tests. Never \
                 re-implement the code under test; read it with read_file."
            }
            AgentKind::Research => {
                "You are a research agent. Investigate the codebase with read-only \
                 tools and answer with a concise, sourced summary."
            }
            AgentKind::Review => {
                "You are a review agent. You inspect code with read-only tools and \
                 report findings. You never modify anything."
            }
            AgentKind::Analysis => {
                "You are an analysis agent. Diagnose the described problem using the \
                 available tools and report root cause plus a suggested fix."
            }
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentKind::Chat => "chat",
            AgentKind::Code => "code",
            AgentKind::Test => "test",
            AgentKind::Research => "research",
            AgentKind::Review => "review",
            AgentKind::Analysis => "analysis",
        };
        write!(f, "{s}")
    }
}
