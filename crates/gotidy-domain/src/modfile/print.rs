use super::{Block, Line, Stmt};

pub(super) fn format(stmts: &[Stmt], trailing: &[String]) -> String {
    let mut out = String::new();
    for (idx, stmt) in stmts.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        match stmt {
            Stmt::Comments(comments) => push_comments(&mut out, comments, ""),
            Stmt::Line { verb, line } => {
                push_comments(&mut out, &line.before, "");
                out.push_str(verb);
                out.push(' ');
                push_line_body(&mut out, line);
            }
            Stmt::Block(block) => push_block(&mut out, block),
        }
    }
    if !trailing.is_empty() {
        if !stmts.is_empty() {
            out.push('\n');
        }
        push_comments(&mut out, trailing, "");
    }
    out
}

fn push_block(out: &mut String, block: &Block) {
    push_comments(out, &block.before, "");
    out.push_str(&block.verb);
    out.push_str(" (");
    push_suffix(out, block.lparen_suffix.as_deref());
    out.push('\n');
    for line in &block.lines {
        push_comments(out, &line.before, "\t");
        out.push('\t');
        push_line_body(out, line);
    }
    push_comments(out, &block.rparen_before, "\t");
    out.push(')');
    push_suffix(out, block.rparen_suffix.as_deref());
    out.push('\n');
}

fn push_line_body(out: &mut String, line: &Line) {
    out.push_str(&join_tokens(&line.tokens));
    push_suffix(out, line.suffix.as_deref());
    out.push('\n');
}

fn push_comments(out: &mut String, comments: &[String], indent: &str) {
    for comment in comments {
        out.push_str(indent);
        out.push_str(comment);
        out.push('\n');
    }
}

fn push_suffix(out: &mut String, suffix: Option<&str>) {
    if let Some(suffix) = suffix {
        out.push(' ');
        out.push_str(suffix);
    }
}

fn join_tokens(tokens: &[String]) -> String {
    let mut joined = String::new();
    let mut prev: Option<&str> = None;
    for token in tokens {
        if let Some(prev) = prev {
            let tight = matches!(prev, "(" | "[") || matches!(token.as_str(), "," | ")" | "]");
            if !tight {
                joined.push(' ');
            }
        }
        joined.push_str(token);
        prev = Some(token.as_str());
    }
    joined
}
