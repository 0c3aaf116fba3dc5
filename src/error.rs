pub type TalcResult<T> = std::result::Result<T, TalcError>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyntaxErrorKind {
    /// The expression begins with the target code-open marker (`<?`).
    CodeOpenMarker,
    /// The expression ends with a statement terminator (`;`).
    TrailingTerminator,
    /// A token outside the expression allow-list.
    DisallowedToken { lexeme: String },
    /// `++`/`--` directly adjacent to a further `+`/`-` of the same symbol.
    AmbiguousIncrement { lexeme: String },
    /// A ternary `:` with no enclosing `?` at the same nesting depth.
    TernaryWithoutCondition,
    /// More than one top-level group remained after a full pass.
    MultipleStatements,
    /// An opening `(`/`[`/`?` was never closed.
    UnbalancedGroup { opener: char },
    /// A closing `)`/`]` with no matching opener.
    UnexpectedClose { closer: char },
    /// A quoted string literal was never terminated.
    UnterminatedString,
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CodeOpenMarker => {
                write!(f, "Expression must not begin with a code-open marker")
            }
            Self::TrailingTerminator => {
                write!(f, "Expression must not end with a statement terminator")
            }
            Self::DisallowedToken { lexeme } => {
                write!(f, "Token '{}' is not allowed in an expression", lexeme)
            }
            Self::AmbiguousIncrement { lexeme } => {
                write!(f, "Ambiguous operator sequence '{}'", lexeme)
            }
            Self::TernaryWithoutCondition => {
                write!(f, "Ternary ':' with no preceding '?'")
            }
            Self::MultipleStatements => {
                write!(f, "Expression must be a single statement")
            }
            Self::UnbalancedGroup { opener } => {
                write!(f, "Unclosed '{}' in expression", opener)
            }
            Self::UnexpectedClose { closer } => {
                write!(f, "Unmatched '{}' in expression", closer)
            }
            Self::UnterminatedString => {
                write!(f, "Unterminated string literal")
            }
        }
    }
}

impl std::error::Error for SyntaxErrorKind {}

/// A malformed expression. Always fatal to the compile that produced it;
/// carries the offending source fragment for reporting.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntaxError {
    pub fragment: String,
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub fn new<T: Into<String>>(fragment: T, kind: SyntaxErrorKind) -> Self {
        Self {
            fragment: fragment.into(),
            kind,
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Syntax error in '{}': {}", self.fragment, self.kind)
    }
}

impl std::error::Error for SyntaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirectiveErrorKind {
    /// A clause was empty or missing its leading name.
    MalformedClause { clause: String },
    /// A loop header that does not match the expected `item list` shape.
    MalformedLoop { header: String },
    /// A function-call argument list that could not be split.
    MalformedArguments { arguments: String },
    /// The directive value failed expression compilation.
    Expression(SyntaxError),
}

impl std::fmt::Display for DirectiveErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedClause { clause } => {
                write!(f, "Malformed clause '{}'", clause)
            }
            Self::MalformedLoop { header } => {
                write!(f, "Malformed loop header '{}'", header)
            }
            Self::MalformedArguments { arguments } => {
                write!(f, "Malformed argument list '{}'", arguments)
            }
            Self::Expression(inner) => {
                write!(f, "{}", inner)
            }
        }
    }
}

impl std::error::Error for DirectiveErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Expression(inner) => Some(inner),
            Self::MalformedClause { .. }
            | Self::MalformedLoop { .. }
            | Self::MalformedArguments { .. } => None,
        }
    }
}

/// A structurally invalid directive, surfaced with the directive name and
/// the tag of the element it was found on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectiveError {
    pub directive: String,
    pub tag: String,
    pub kind: DirectiveErrorKind,
}

impl std::fmt::Display for DirectiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Directive '{}' on <{}>: {}",
            self.directive, self.tag, self.kind
        )
    }
}

impl std::error::Error for DirectiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkupErrorKind {
    UnexpectedEof {
        /// Describes what was expected, e.g., "(expected '>')"
        expected_what: String,
    },
    MismatchedCloseTag {
        expected: String,
        found: String,
    },
    MalformedAttribute {
        at_char: String,
    },
    Expected {
        description: String,
    },
}

impl std::fmt::Display for MarkupErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { expected_what } => {
                write!(f, "Unexpected EOF{}", expected_what)
            }
            Self::MismatchedCloseTag { expected, found } => {
                write!(f, "Expected </{}>, found </{}>", expected, found)
            }
            Self::MalformedAttribute { at_char } => {
                write!(f, "Malformed attribute starting with '{}'", at_char)
            }
            Self::Expected { description } => {
                write!(f, "Expected {}", description)
            }
        }
    }
}

impl std::error::Error for MarkupErrorKind {}

impl MarkupErrorKind {
    pub fn unexpected_eof(expected: Option<String>) -> Self {
        Self::UnexpectedEof {
            expected_what: expected.map_or_else(String::new, |e| format!(" (expected '{}')", e)),
        }
    }
}

/// An error from the markup tokenizer, with the position it occurred at.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkupError {
    pub line: usize,
    pub column: usize,
    pub kind: MarkupErrorKind,
}

impl std::fmt::Display for MarkupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Markup error at line {}, column {}: {}",
            self.line, self.column, self.kind
        )
    }
}

impl std::error::Error for MarkupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TalcError {
    Syntax(SyntaxError),
    Directive(DirectiveError),
    Markup(MarkupError),
}

impl std::fmt::Display for TalcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax(inner) => write!(f, "{}", inner),
            Self::Directive(inner) => write!(f, "{}", inner),
            Self::Markup(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for TalcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Syntax(inner) => Some(inner),
            Self::Directive(inner) => Some(inner),
            Self::Markup(inner) => Some(inner),
        }
    }
}

impl From<SyntaxError> for TalcError {
    fn from(error: SyntaxError) -> Self {
        Self::Syntax(error)
    }
}

impl From<DirectiveError> for TalcError {
    fn from(error: DirectiveError) -> Self {
        Self::Directive(error)
    }
}

impl From<MarkupError> for TalcError {
    fn from(error: MarkupError) -> Self {
        Self::Markup(error)
    }
}

impl TalcError {
    /// Attach directive context to an error raised while compiling a
    /// directive value expression.
    pub(crate) fn in_directive(self, directive: &str, tag: &str) -> Self {
        match self {
            Self::Syntax(inner) => Self::Directive(DirectiveError {
                directive: directive.to_string(),
                tag: tag.to_string(),
                kind: DirectiveErrorKind::Expression(inner),
            }),
            Self::Directive(_) | Self::Markup(_) => self,
        }
    }
}
