//! Error types and reporting

use crate::ast::{Location, Span, offset_of};
use crate::interp::RuntimeError;
use crate::values::ConversionError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CompileError>;

/// Errors of the front end and of package loading.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{file}:{}: lexer error: {message}", span.pos)]
    Lexer {
        message: String,
        file: String,
        span: Span,
    },

    #[error("{file}:{}: {message}", span.pos)]
    Parser {
        message: String,
        file: String,
        span: Span,
    },

    #[error("name error: {message}")]
    Name { message: String },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// An error raised while preprocessing a node. `stack` lists the
    /// enclosing block nodes, innermost last.
    #[error("{location}: {message}")]
    Preprocess {
        message: String,
        location: Location,
        stack: Vec<String>,
    },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::Name {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Annotates an error with the node it was raised at. An error that
    /// already carries a location is returned unchanged.
    pub fn at(self, location: Location, stack: Vec<String>) -> Self {
        match self {
            Self::Preprocess { .. } | Self::Runtime(_) => self,
            other => Self::Preprocess {
                message: other.message(),
                location,
                stack,
            },
        }
    }

    /// The message without location prefixes.
    pub fn message(&self) -> String {
        match self {
            Self::Lexer { message, .. }
            | Self::Parser { message, .. }
            | Self::Preprocess { message, .. }
            | Self::Io { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// File and span the error points at, when known.
    pub fn position(&self) -> Option<(&str, Span)> {
        match self {
            Self::Lexer { file, span, .. } | Self::Parser { file, span, .. } => Some((file, *span)),
            Self::Preprocess { location, .. } if !location.is_zero() => {
                Some((&location.file, location.span))
            }
            _ => None,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Lexer { .. } => "Lexer",
            Self::Parser { .. } => "Parser",
            Self::Name { .. } => "Name",
            Self::Type { .. } => "Type",
            Self::Syntax { .. } => "Syntax",
            Self::Conversion(_) => "Conversion",
            Self::Preprocess { .. } => "Preprocess",
            Self::Io { .. } => "IO",
            Self::Runtime(_) => "Runtime",
        }
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

/// Renders an error against the source it points into.
pub fn render_error(filename: &str, source: &str, error: &CompileError) -> String {
    use ariadne::{Config, Label, Report, ReportKind, Source};

    let mut out = Vec::new();
    let config = Config::default().with_color(false);
    let report = match error.position() {
        Some((_, span)) => {
            let start = offset_of(source, span.pos);
            let end = offset_of(source, span.end).max(start);
            Report::build(ReportKind::Error, (filename, start..end))
                .with_config(config)
                .with_message(format!("{} error", error.kind_name()))
                .with_label(Label::new((filename, start..end)).with_message(error.message()))
                .finish()
        }
        None => Report::build(ReportKind::Error, (filename, 0..0))
            .with_config(config)
            .with_message(format!("{} error: {}", error.kind_name(), error.message()))
            .finish(),
    };
    if report
        .write((filename, Source::from(source)), &mut out)
        .is_err()
    {
        return error.to_string();
    }
    let mut text = String::from_utf8_lossy(&out).into_owned();
    if let CompileError::Preprocess { stack, .. } = error
        && !stack.is_empty()
    {
        text.push_str("--- preprocess stack ---\n");
        for (i, frame) in stack.iter().rev().enumerate() {
            text.push_str(&format!("stack {i}: {frame}\n"));
        }
        text.push_str("------------------------\n");
    }
    text
}

/// Report error with ariadne
pub fn report_error(filename: &str, source: &str, error: &CompileError) {
    eprint!("{}", render_error(filename, source, error));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Pos;

    #[test]
    fn test_annotate_once() {
        let loc = Location::new("main", "a.gno", Span::at(3, 5, 3, 9));
        let e = CompileError::name("name x not declared").at(loc.clone(), vec!["FuncDecl main".into()]);
        assert_eq!(e.to_string(), "main/a.gno:3:5: name error: name x not declared");
        let other = Location::new("main", "a.gno", Span::at(9, 1, 9, 2));
        let again = e.at(other, vec![]);
        let CompileError::Preprocess { location, .. } = &again else {
            panic!("expected preprocess error");
        };
        assert_eq!(location, &loc);
    }

    #[test]
    fn test_render_error_points_at_span() {
        let source = "package main\n\nfunc main() {\n\tx := 1\n}\n";
        let e = CompileError::parser("unexpected token", "main.gno", Span::new(Pos::new(4, 2), Pos::new(4, 3)));
        let text = render_error("main.gno", source, &e);
        assert!(text.contains("Parser error"));
        assert!(text.contains("unexpected token"));
    }
}
