//! A comment-preserving syntax model of `go.mod`.
//!
//! The model keeps statements in source order so that edits (dropping and
//! re-adding requirements, cleanup, block sorting) can be serialized back
//! with the author's comments intact.

use std::{
    mem,
    path::{Path, PathBuf},
};

use serde::Serialize;

mod lexer;
mod print;

pub use lexer::{auto_quote, unquote};

use lexer::{is_punctuation, lex_line};

const DIRECTIVES: [&str; 10] = [
    "module",
    "go",
    "toolchain",
    "godebug",
    "require",
    "exclude",
    "replace",
    "retract",
    "tool",
    "ignore",
];

const BLOCK_DIRECTIVES: [&str; 7] = [
    "godebug", "require", "exclude", "replace", "retract", "tool", "ignore",
];

const INDIRECT: &str = "indirect";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}:{line}: {message}", path.display())]
pub struct ModParseError {
    pub path: PathBuf,
    pub line: usize,
    pub message: String,
}

impl ModParseError {
    pub(crate) fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            path: PathBuf::new(),
            line,
            message: message.into(),
        }
    }

    fn with_path(mut self, path: &Path) -> Self {
        self.path = path.to_path_buf();
        self
    }
}

/// A live `require` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub path: String,
    pub version: String,
    pub indirect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    /// Arguments after the directive verb.
    pub(crate) tokens: Vec<String>,
    pub(crate) before: Vec<String>,
    pub(crate) suffix: Option<String>,
    pub(crate) removed: bool,
}

impl Line {
    fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens,
            before: Vec::new(),
            suffix: None,
            removed: false,
        }
    }

    fn first_arg(&self) -> Option<String> {
        self.tokens.first().map(|token| unquote(token))
    }

    fn is_indirect(&self) -> bool {
        self.suffix.as_deref().is_some_and(|suffix| {
            comment_body(suffix).split(';').next().map(str::trim) == Some(INDIRECT)
        })
    }

    fn set_indirect(&mut self, indirect: bool) {
        if self.is_indirect() == indirect {
            return;
        }
        if indirect {
            self.suffix = Some(match self.suffix.take() {
                Some(existing) => format!("// {INDIRECT}; {}", comment_body(&existing)),
                None => format!("// {INDIRECT}"),
            });
            return;
        }
        let rest = self
            .suffix
            .as_deref()
            .map(comment_body)
            .and_then(|body| body.split_once(';').map(|(_, rest)| rest.trim().to_string()))
            .filter(|rest| !rest.is_empty());
        self.suffix = rest.map(|rest| format!("// {rest}"));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Block {
    pub(crate) verb: String,
    pub(crate) before: Vec<String>,
    pub(crate) lparen_suffix: Option<String>,
    pub(crate) lines: Vec<Line>,
    pub(crate) rparen_before: Vec<String>,
    pub(crate) rparen_suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Stmt {
    Line { verb: String, line: Line },
    Block(Block),
    Comments(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModFile {
    path: PathBuf,
    stmts: Vec<Stmt>,
    trailing: Vec<String>,
}

impl ModFile {
    /// Parse the contents of a go.mod file.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first syntax problem, with its line number.
    pub fn parse(path: impl AsRef<Path>, data: &[u8]) -> Result<Self, ModParseError> {
        let path = path.as_ref();
        parse_text(data).map_err(|err| err.with_path(path)).map(|(stmts, trailing)| Self {
            path: path.to_path_buf(),
            stmts,
            trailing,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn module_path(&self) -> Option<String> {
        self.directive_args("module").and_then(|line| line.first_arg())
    }

    #[must_use]
    pub fn go_version(&self) -> Option<String> {
        self.directive_args("go").and_then(|line| line.first_arg())
    }

    fn directive_args(&self, directive: &str) -> Option<&Line> {
        self.stmts.iter().find_map(|stmt| match stmt {
            Stmt::Line { verb, line } if verb == directive && !line.removed => Some(line),
            _ => None,
        })
    }

    #[must_use]
    pub fn requirements(&self) -> Vec<Requirement> {
        self.require_lines()
            .into_iter()
            .filter_map(|line| {
                Some(Requirement {
                    path: line.first_arg()?,
                    version: line.tokens.get(1)?.clone(),
                    indirect: line.is_indirect(),
                })
            })
            .collect()
    }

    fn require_lines(&self) -> Vec<&Line> {
        let mut lines = Vec::new();
        for stmt in &self.stmts {
            match stmt {
                Stmt::Line { verb, line } if verb == "require" => lines.push(line),
                Stmt::Block(block) if block.verb == "require" => lines.extend(block.lines.iter()),
                _ => {}
            }
        }
        lines.retain(|line| !line.removed);
        lines
    }

    fn require_lines_mut(&mut self) -> Vec<&mut Line> {
        let mut lines = Vec::new();
        for stmt in &mut self.stmts {
            match stmt {
                Stmt::Line { verb, line } if verb == "require" => lines.push(line),
                Stmt::Block(block) if block.verb == "require" => {
                    lines.extend(block.lines.iter_mut());
                }
                _ => {}
            }
        }
        lines.retain(|line| !line.removed);
        lines
    }

    /// Mark every `require` entry for `path` as removed. Block structure is
    /// kept until [`ModFile::cleanup`] runs.
    pub fn drop_requirement(&mut self, path: &str) -> bool {
        let mut dropped = false;
        for line in self.require_lines_mut() {
            if line.first_arg().as_deref() == Some(path) {
                line.removed = true;
                dropped = true;
            }
        }
        dropped
    }

    /// Set the required version of `path`, appending a new entry to the last
    /// `require` statement when the module is not required yet.
    pub fn add_requirement(&mut self, path: &str, version: &str) {
        let mut seen = false;
        for line in self.require_lines_mut() {
            if line.first_arg().as_deref() != Some(path) {
                continue;
            }
            if seen {
                line.removed = true;
            } else {
                line.tokens = vec![auto_quote(path), version.to_string()];
                seen = true;
            }
        }
        if seen {
            return;
        }

        let new_line = Line::new(vec![auto_quote(path), version.to_string()]);
        let hint = self.stmts.iter().rposition(|stmt| match stmt {
            Stmt::Line { verb, line } => verb == "require" && !line.removed,
            Stmt::Block(block) => block.verb == "require",
            Stmt::Comments(_) => false,
        });
        let Some(idx) = hint else {
            self.stmts.push(Stmt::Line {
                verb: "require".to_string(),
                line: new_line,
            });
            return;
        };

        let stmt = &mut self.stmts[idx];
        *stmt = match mem::replace(stmt, Stmt::Comments(Vec::new())) {
            Stmt::Block(mut block) => {
                block.lines.push(new_line);
                Stmt::Block(block)
            }
            Stmt::Line { verb, line } => Stmt::Block(Block {
                verb,
                before: Vec::new(),
                lparen_suffix: None,
                lines: vec![line, new_line],
                rparen_before: Vec::new(),
                rparen_suffix: None,
            }),
            comments @ Stmt::Comments(_) => comments,
        };
    }

    /// Add or remove the `// indirect` marker of a live requirement.
    pub fn set_indirect(&mut self, path: &str, indirect: bool) -> bool {
        let mut found = false;
        for line in self.require_lines_mut() {
            if line.first_arg().as_deref() == Some(path) {
                line.set_indirect(indirect);
                found = true;
            }
        }
        found
    }

    /// Physically drop removed entries, delete empty blocks and collapse
    /// single-entry blocks into plain lines.
    pub fn cleanup(&mut self) {
        let stmts = mem::take(&mut self.stmts);
        for stmt in stmts {
            match stmt {
                Stmt::Line { line, .. } if line.removed => {}
                Stmt::Block(mut block) => {
                    block.lines.retain(|line| !line.removed);
                    if block.lines.is_empty() {
                        continue;
                    }
                    if block.lines.len() == 1 && block.rparen_before.is_empty() {
                        self.stmts.push(collapse_block(block));
                        continue;
                    }
                    self.stmts.push(Stmt::Block(block));
                }
                other => self.stmts.push(other),
            }
        }
    }

    /// Sort the entries of every block and drop exact duplicates. Retract
    /// blocks keep their author order.
    pub fn sort_blocks(&mut self) {
        for stmt in &mut self.stmts {
            let Stmt::Block(block) = stmt else {
                continue;
            };
            if block.verb == "retract" {
                continue;
            }
            block.lines.sort_by(|a, b| a.tokens.cmp(&b.tokens));
            block.lines.dedup_by(|later, earlier| later.tokens == earlier.tokens);
        }
    }

    /// Serialize the file in canonical go.mod layout.
    #[must_use]
    pub fn format(&self) -> Vec<u8> {
        print::format(&self.stmts, &self.trailing).into_bytes()
    }
}

fn collapse_block(block: Block) -> Stmt {
    let Block {
        verb,
        mut before,
        lparen_suffix,
        mut lines,
        rparen_suffix,
        ..
    } = block;
    let mut line = lines.remove(0);
    before.extend(lparen_suffix);
    before.append(&mut line.before);
    line.before = before;
    match (line.suffix.is_some(), rparen_suffix) {
        (false, suffix) => line.suffix = suffix,
        (true, Some(extra)) => line.before.push(extra),
        (true, None) => {}
    }
    Stmt::Line { verb, line }
}

fn comment_body(comment: &str) -> &str {
    comment.trim_start_matches("//").trim()
}

type Parsed = (Vec<Stmt>, Vec<String>);

fn parse_text(data: &[u8]) -> Result<Parsed, ModParseError> {
    let text = std::str::from_utf8(data).map_err(|err| {
        let line = data[..err.valid_up_to()]
            .iter()
            .filter(|byte| **byte == b'\n')
            .count()
            + 1;
        ModParseError::at(line, "invalid UTF-8")
    })?;

    let mut stmts = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut open: Option<(usize, Block)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let lexed = lex_line(raw, line_no)?;

        if lexed.tokens.is_empty() {
            if let Some(comment) = lexed.comment {
                pending.push(comment);
            } else if open.is_none() && !pending.is_empty() {
                stmts.push(Stmt::Comments(mem::take(&mut pending)));
            }
            continue;
        }

        if let Some((_, block)) = open.as_mut() {
            if lexed.tokens == [")"] {
                block.rparen_before = mem::take(&mut pending);
                block.rparen_suffix = lexed.comment;
                if let Some((_, block)) = open.take() {
                    stmts.push(Stmt::Block(block));
                }
                continue;
            }
            validate_args(&block.verb, &lexed.tokens, line_no)?;
            block.lines.push(Line {
                tokens: lexed.tokens,
                before: mem::take(&mut pending),
                suffix: lexed.comment,
                removed: false,
            });
            continue;
        }

        let mut tokens = lexed.tokens;
        let verb = tokens.remove(0);
        if !DIRECTIVES.contains(&verb.as_str()) {
            return Err(ModParseError::at(line_no, format!("unknown directive: {verb}")));
        }

        if tokens.first().map(String::as_str) == Some("(") {
            if !BLOCK_DIRECTIVES.contains(&verb.as_str()) {
                return Err(ModParseError::at(
                    line_no,
                    format!("{verb} directive does not accept a block"),
                ));
            }
            let mut block = Block {
                verb,
                before: mem::take(&mut pending),
                lparen_suffix: lexed.comment,
                lines: Vec::new(),
                rparen_before: Vec::new(),
                rparen_suffix: None,
            };
            match &tokens[1..] {
                [] => open = Some((line_no, block)),
                [close] if close == ")" => {
                    block.rparen_suffix = block.lparen_suffix.take();
                    stmts.push(Stmt::Block(block));
                }
                _ => {
                    return Err(ModParseError::at(
                        line_no,
                        "unexpected tokens after opening parenthesis",
                    ))
                }
            }
            continue;
        }

        validate_args(&verb, &tokens, line_no)?;
        stmts.push(Stmt::Line {
            verb,
            line: Line {
                tokens,
                before: mem::take(&mut pending),
                suffix: lexed.comment,
                removed: false,
            },
        });
    }

    if let Some((line_no, block)) = open {
        return Err(ModParseError::at(
            line_no,
            format!("{} block is missing its closing parenthesis", block.verb),
        ));
    }

    Ok((stmts, pending))
}

fn validate_args(verb: &str, args: &[String], line: usize) -> Result<(), ModParseError> {
    let plain = |token: &String| !is_punctuation(token);
    let usage = |expected: &str| {
        Err(ModParseError::at(
            line,
            format!("usage: {verb} {expected}"),
        ))
    };

    match verb {
        "module" | "go" | "toolchain" | "tool" | "ignore" => match args {
            [value] if plain(value) => Ok(()),
            _ => usage(match verb {
                "module" => "module/path",
                "go" => "1.23",
                "toolchain" => "go1.23.0",
                _ => "path",
            }),
        },
        "godebug" => match args {
            [value] if plain(value) && value.contains('=') => Ok(()),
            _ => usage("key=value"),
        },
        "require" | "exclude" => match args {
            [path, version] if plain(path) && plain(version) => Ok(()),
            _ => usage("module/path v1.2.3"),
        },
        "replace" => {
            let Some(arrow) = args.iter().position(|token| token == "=>") else {
                return usage("module/path [v1.2.3] => other/module [v1.4.5]");
            };
            let lhs = &args[..arrow];
            let rhs = &args[arrow + 1..];
            if (1..=2).contains(&lhs.len())
                && (1..=2).contains(&rhs.len())
                && lhs.iter().chain(rhs).all(plain)
            {
                Ok(())
            } else {
                usage("module/path [v1.2.3] => other/module [v1.4.5]")
            }
        }
        "retract" => match args {
            [version] if plain(version) => Ok(()),
            [open, low, comma, high, close]
                if open == "[" && comma == "," && close == "]" && plain(low) && plain(high) =>
            {
                Ok(())
            }
            _ => usage("v1.2.3 or [v1.2.3, v1.3.0]"),
        },
        _ => Err(ModParseError::at(line, format!("unknown directive: {verb}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ModFile {
        ModFile::parse("go.mod", text.as_bytes()).expect("parse go.mod")
    }

    fn normalized(text: &str) -> String {
        let mut file = parse(text);
        for req in file.requirements() {
            file.drop_requirement(&req.path);
            file.add_requirement(&req.path, &req.version);
            file.set_indirect(&req.path, req.indirect);
        }
        file.cleanup();
        file.sort_blocks();
        String::from_utf8(file.format()).expect("utf-8")
    }

    #[test]
    fn reads_module_go_and_requirements() {
        let file = parse(
            "module example.com/app\n\ngo 1.21\n\nrequire (\n\tgithub.com/b/b v2.0.0 // indirect\n\tgithub.com/a/a v1.0.0\n)\n",
        );
        assert_eq!(file.module_path().as_deref(), Some("example.com/app"));
        assert_eq!(file.go_version().as_deref(), Some("1.21"));
        let reqs = file.requirements();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].path, "github.com/b/b");
        assert!(reqs[0].indirect);
        assert!(!reqs[1].indirect);
    }

    #[test]
    fn normalization_sorts_requirements() {
        let out = normalized(
            "module example.com/app\n\ngo 1.21\n\nrequire (\n\tgithub.com/b/b v2.0.0\n\tgithub.com/a/a v1.0.0\n)\n",
        );
        assert_eq!(
            out,
            "module example.com/app\n\ngo 1.21\n\nrequire (\n\tgithub.com/a/a v1.0.0\n\tgithub.com/b/b v2.0.0\n)\n"
        );
    }

    #[test]
    fn normalization_joins_require_blocks_into_the_last_one() {
        let out = normalized(
            "module m\n\ngo 1.21\n\nrequire (\n\tgithub.com/z/z v1.0.0\n)\n\nrequire (\n\tgithub.com/c/c v0.3.0 // indirect\n\tgithub.com/a/a v0.1.0 // indirect\n)\n",
        );
        assert_eq!(
            out,
            "module m\n\ngo 1.21\n\nrequire (\n\tgithub.com/a/a v0.1.0 // indirect\n\tgithub.com/c/c v0.3.0 // indirect\n\tgithub.com/z/z v1.0.0\n)\n"
        );
    }

    #[test]
    fn single_entry_block_collapses_to_a_line() {
        let out = normalized("module m\n\nrequire (\n\tgithub.com/a/a v1.0.0\n)\n");
        assert_eq!(out, "module m\n\nrequire github.com/a/a v1.0.0\n");
    }

    #[test]
    fn duplicate_requirements_are_merged() {
        let out = normalized(
            "module m\n\nrequire (\n\tgithub.com/a/a v1.0.0\n\tgithub.com/b/b v1.0.0\n\tgithub.com/a/a v1.0.0\n)\n",
        );
        assert_eq!(
            out,
            "module m\n\nrequire (\n\tgithub.com/a/a v1.0.0\n\tgithub.com/b/b v1.0.0\n)\n"
        );
    }

    #[test]
    fn add_requirement_converts_single_line_into_block() {
        let mut file = parse("module m\n\nrequire github.com/a/a v1.0.0\n");
        file.add_requirement("github.com/b/b", "v0.2.0");
        let out = String::from_utf8(file.format()).expect("utf-8");
        assert_eq!(
            out,
            "module m\n\nrequire (\n\tgithub.com/a/a v1.0.0\n\tgithub.com/b/b v0.2.0\n)\n"
        );
    }

    #[test]
    fn add_requirement_without_require_appends_a_line() {
        let mut file = parse("module m\n\ngo 1.22\n");
        file.add_requirement("github.com/a/a", "v1.0.0");
        let out = String::from_utf8(file.format()).expect("utf-8");
        assert_eq!(out, "module m\n\ngo 1.22\n\nrequire github.com/a/a v1.0.0\n");
    }

    #[test]
    fn add_requirement_updates_existing_version() {
        let mut file = parse("module m\n\nrequire github.com/a/a v1.0.0\n");
        file.add_requirement("github.com/a/a", "v1.2.0");
        assert_eq!(file.requirements()[0].version, "v1.2.0");
    }

    #[test]
    fn comments_survive_normalization() {
        let out = normalized(
            "// Service module.\nmodule m\n\n// pinned for the 1.x API\nreplace github.com/a/a => ../a\n\nrequire (\n\tgithub.com/b/b v1.0.0\n\tgithub.com/a/a v1.0.0\n)\n\n// trailing note\n",
        );
        assert!(out.starts_with("// Service module.\nmodule m\n"));
        assert!(out.contains("// pinned for the 1.x API\nreplace github.com/a/a => ../a\n"));
        assert!(out.ends_with("\n// trailing note\n"));
    }

    #[test]
    fn set_indirect_edits_suffix_comment() {
        let mut file = parse("module m\n\nrequire github.com/a/a v1.0.0 // indirect; keep\n");
        file.set_indirect("github.com/a/a", false);
        assert!(!file.requirements()[0].indirect);
        let out = String::from_utf8(file.format()).expect("utf-8");
        assert!(out.contains("github.com/a/a v1.0.0 // keep\n"));
        file.set_indirect("github.com/a/a", true);
        assert!(file.requirements()[0].indirect);
    }

    #[test]
    fn retract_ranges_keep_compact_spelling() {
        let file = parse("module m\n\nretract [v1.0.0, v1.0.5]\n");
        let out = String::from_utf8(file.format()).expect("utf-8");
        assert_eq!(out, "module m\n\nretract [v1.0.0, v1.0.5]\n");
    }

    #[test]
    fn unknown_directive_is_rejected_with_line() {
        let err = ModFile::parse("dir/go.mod", b"module m\n\nrequires x v1\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.to_string().starts_with("dir/go.mod:3:"));
    }

    #[test]
    fn malformed_require_is_rejected() {
        let err = ModFile::parse("go.mod", b"module m\nrequire github.com/a/a\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unclosed_block_is_rejected() {
        let err = ModFile::parse("go.mod", b"module m\nrequire (\n\tgithub.com/a/a v1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("closing parenthesis"));
    }

    #[test]
    fn block_for_single_value_directive_is_rejected() {
        assert!(ModFile::parse("go.mod", b"module (\n\tm\n)\n").is_err());
    }
}
