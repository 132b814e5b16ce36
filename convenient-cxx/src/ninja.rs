//! Streaming parser for ninja build files.
//!
//! CMake's Ninja generator writes the whole compilation DAG into
//! `build.ninja` and `rules.ninja`; walking those files recovers target
//! structure that `compile_commands.json` alone doesn't carry. Statements
//! are delivered one at a time through a callback so a multi-megabyte
//! `build.ninja` never has to be held in memory.
//!
//! Escape handling follows ninja's lexer: `$` at end of line continues the
//! logical line, and any other `$x` pair (`$ `, `$:`, `$$`) is kept
//! verbatim in the stored text while suppressing the following character's
//! meaning as a separator.

use std::io::BufRead;

use crate::error::{ConfigureError, ConfigureResult};

/// One top-level statement of a ninja build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NinjaStatement {
    /// `name = value` at file scope.
    Assignment { name: String, value: String },
    /// `rule NAME` with its indented properties.
    Rule {
        name: String,
        properties: Vec<(String, String)>,
    },
    /// `pool NAME` with its indented properties.
    Pool {
        name: String,
        properties: Vec<(String, String)>,
    },
    /// `build OUTPUTS [| IMPLICIT] : RULE [INPUTS] [| IMPLICIT] [|| ORDER-ONLY]`.
    Build(NinjaBuildStatement),
    /// `default TARGETS`.
    Default { targets: Vec<String> },
    /// `include FILE`.
    Include { file: String },
    /// `subninja FILE`.
    SubNinja { file: String },
}

/// The sections of a `build` statement, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NinjaBuildStatement {
    pub explicit_outputs: Vec<String>,
    pub implicit_outputs: Vec<String>,
    pub rule: String,
    pub explicit_inputs: Vec<String>,
    pub implicit_inputs: Vec<String>,
    pub order_only_inputs: Vec<String>,
    pub properties: Vec<(String, String)>,
}

/// Stream the statements of a ninja build file to `callback`.
///
/// Comments and blank lines are skipped; a comment or blank line inside a
/// rule, pool, or build property scope does not close the scope. Syntax
/// errors abort the stream with the offending line number.
pub fn stream_ninja_statements<R: BufRead>(
    reader: R,
    mut callback: impl FnMut(NinjaStatement),
) -> ConfigureResult<()> {
    let mut scope: Option<OpenScope> = None;
    let mut logical = String::new();
    let mut logical_start = 0usize;
    let mut continuing = false;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if !continuing {
            logical.clear();
            logical_start = index + 1;
        }
        let (text, continues) = strip_continuation(&line);
        if continuing {
            // The continuation eats the newline and the next line's indent
            logical.push_str(text.trim_start());
        } else {
            logical.push_str(text);
        }
        continuing = continues;
        if !continuing {
            process_line(&logical, logical_start, &mut scope, &mut callback)?;
        }
    }
    if continuing {
        process_line(&logical, logical_start, &mut scope, &mut callback)?;
    }
    if let Some(open) = scope.take() {
        callback(open.finish());
    }
    Ok(())
}

/// A rule, pool, or build statement still accepting indented properties.
enum OpenScope {
    Rule {
        name: String,
        properties: Vec<(String, String)>,
    },
    Pool {
        name: String,
        properties: Vec<(String, String)>,
    },
    Build(NinjaBuildStatement),
}

impl OpenScope {
    fn push_property(&mut self, name: String, value: String) {
        match self {
            OpenScope::Rule { properties, .. } | OpenScope::Pool { properties, .. } => {
                properties.push((name, value));
            }
            OpenScope::Build(build) => build.properties.push((name, value)),
        }
    }

    fn finish(self) -> NinjaStatement {
        match self {
            OpenScope::Rule { name, properties } => NinjaStatement::Rule { name, properties },
            OpenScope::Pool { name, properties } => NinjaStatement::Pool { name, properties },
            OpenScope::Build(build) => NinjaStatement::Build(build),
        }
    }
}

fn process_line(
    line: &str,
    number: usize,
    scope: &mut Option<OpenScope>,
    callback: &mut impl FnMut(NinjaStatement),
) -> ConfigureResult<()> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(());
    }
    if line.starts_with(' ') || line.starts_with('\t') {
        let Some(open) = scope.as_mut() else {
            return Err(syntax(
                number,
                "indented property outside a rule, pool, or build statement",
            ));
        };
        let Some((name, value)) = split_assignment(trimmed) else {
            return Err(syntax(number, "expected 'name = value'"));
        };
        open.push_property(name, value);
        return Ok(());
    }

    // A non-indented line closes whatever scope was open
    if let Some(open) = scope.take() {
        callback(open.finish());
    }

    let (word, rest) = trimmed
        .split_once(|c: char| c.is_whitespace())
        .unwrap_or((trimmed, ""));
    match word {
        "rule" | "pool" => {
            // Anything after the name, trailing comments included, is noise
            let name = split_tokens(rest).into_iter().next().unwrap_or_default();
            let properties = Vec::new();
            *scope = Some(if word == "rule" {
                OpenScope::Rule { name, properties }
            } else {
                OpenScope::Pool { name, properties }
            });
        }
        "build" => {
            *scope = Some(OpenScope::Build(parse_build(build_tokens(rest), number)?));
        }
        "default" => {
            let targets = split_tokens(rest);
            if targets.is_empty() {
                return Err(syntax(number, "default statement has no targets"));
            }
            callback(NinjaStatement::Default { targets });
        }
        "include" | "subninja" => {
            let mut tokens = split_tokens(rest).into_iter();
            let (Some(file), None) = (tokens.next(), tokens.next()) else {
                return Err(syntax(number, format!("{word} expects exactly one file")));
            };
            callback(if word == "include" {
                NinjaStatement::Include { file }
            } else {
                NinjaStatement::SubNinja { file }
            });
        }
        _ => match split_assignment(trimmed) {
            Some((name, value)) => callback(NinjaStatement::Assignment { name, value }),
            None => return Err(syntax(number, "unrecognized statement")),
        },
    }
    Ok(())
}

fn syntax(line: usize, message: impl Into<String>) -> ConfigureError {
    ConfigureError::NinjaSyntax {
        line,
        message: message.into(),
    }
}

/// Split off a trailing line continuation: a `$` that escapes the newline
/// rather than the next character.
fn strip_continuation(line: &str) -> (&str, bool) {
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '$' && chars.next().is_none() {
            return (&line[..i], true);
        }
    }
    (line, false)
}

/// First unescaped `=` splits an assignment; name and value are trimmed.
fn split_assignment(line: &str) -> Option<(String, String)> {
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '$' => {
                chars.next();
            }
            '=' => {
                return Some((
                    line[..i].trim().to_string(),
                    line[i + 1..].trim().to_string(),
                ));
            }
            _ => {}
        }
    }
    None
}

/// Whitespace-separated tokens; an escaped space (`$ `) stays inside its
/// token, escapes kept verbatim.
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '$' => {
                current.push('$');
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

enum BuildToken {
    Text(String),
    Pipe,
    DoublePipe,
    Colon,
}

/// Tokenize the remainder of a `build` line. `:`, `|` and `||` separate
/// sections even without surrounding spaces, unless escaped with `$`.
fn build_tokens(text: &str) -> Vec<BuildToken> {
    fn flush(current: &mut String, tokens: &mut Vec<BuildToken>) {
        if !current.is_empty() {
            tokens.push(BuildToken::Text(std::mem::take(current)));
        }
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => {
                current.push('$');
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            ':' => {
                flush(&mut current, &mut tokens);
                tokens.push(BuildToken::Colon);
            }
            '|' => {
                flush(&mut current, &mut tokens);
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(BuildToken::DoublePipe);
                } else {
                    tokens.push(BuildToken::Pipe);
                }
            }
            other => current.push(other),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn parse_build(tokens: Vec<BuildToken>, number: usize) -> ConfigureResult<NinjaBuildStatement> {
    let mut build = NinjaBuildStatement::default();
    let mut iter = tokens.into_iter().peekable();

    fn take_texts(
        iter: &mut std::iter::Peekable<std::vec::IntoIter<BuildToken>>,
        into: &mut Vec<String>,
    ) {
        while matches!(iter.peek(), Some(BuildToken::Text(_))) {
            if let Some(BuildToken::Text(text)) = iter.next() {
                into.push(text);
            }
        }
    }

    take_texts(&mut iter, &mut build.explicit_outputs);
    if matches!(iter.peek(), Some(BuildToken::Pipe)) {
        iter.next();
        take_texts(&mut iter, &mut build.implicit_outputs);
    }
    if build.explicit_outputs.is_empty() {
        return Err(syntax(number, "build statement has no outputs"));
    }
    if !matches!(iter.next(), Some(BuildToken::Colon)) {
        return Err(syntax(number, "build statement is missing ':'"));
    }
    match iter.next() {
        Some(BuildToken::Text(rule)) => build.rule = rule,
        _ => return Err(syntax(number, "build statement is missing a rule name")),
    }
    take_texts(&mut iter, &mut build.explicit_inputs);
    if matches!(iter.peek(), Some(BuildToken::Pipe)) {
        iter.next();
        take_texts(&mut iter, &mut build.implicit_inputs);
    }
    if matches!(iter.peek(), Some(BuildToken::DoublePipe)) {
        iter.next();
        take_texts(&mut iter, &mut build.order_only_inputs);
    }
    if iter.next().is_some() {
        return Err(syntax(number, "unexpected separator after build inputs"));
    }
    Ok(build)
}

impl std::fmt::Display for NinjaStatement {
    /// Canonical single-space form; properties come out two-space indented.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn properties(
            f: &mut std::fmt::Formatter<'_>,
            properties: &[(String, String)],
        ) -> std::fmt::Result {
            for (name, value) in properties {
                write!(f, "\n  {name} = {value}")?;
            }
            Ok(())
        }

        match self {
            NinjaStatement::Assignment { name, value } => write!(f, "{name} = {value}"),
            NinjaStatement::Rule {
                name,
                properties: props,
            } => {
                write!(f, "rule {name}")?;
                properties(f, props)
            }
            NinjaStatement::Pool {
                name,
                properties: props,
            } => {
                write!(f, "pool {name}")?;
                properties(f, props)
            }
            NinjaStatement::Build(build) => {
                write!(f, "build")?;
                for output in &build.explicit_outputs {
                    write!(f, " {output}")?;
                }
                if !build.implicit_outputs.is_empty() {
                    write!(f, " |")?;
                    for output in &build.implicit_outputs {
                        write!(f, " {output}")?;
                    }
                }
                write!(f, " : {}", build.rule)?;
                for input in &build.explicit_inputs {
                    write!(f, " {input}")?;
                }
                if !build.implicit_inputs.is_empty() {
                    write!(f, " |")?;
                    for input in &build.implicit_inputs {
                        write!(f, " {input}")?;
                    }
                }
                if !build.order_only_inputs.is_empty() {
                    write!(f, " ||")?;
                    for input in &build.order_only_inputs {
                        write!(f, " {input}")?;
                    }
                }
                properties(f, &build.properties)
            }
            NinjaStatement::Default { targets } => {
                write!(f, "default")?;
                for target in targets {
                    write!(f, " {target}")?;
                }
                Ok(())
            }
            NinjaStatement::Include { file } => write!(f, "include {file}"),
            NinjaStatement::SubNinja { file } => write!(f, "subninja {file}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Vec<NinjaStatement> {
        let mut statements = Vec::new();
        stream_ninja_statements(Cursor::new(text), |statement| statements.push(statement))
            .unwrap();
        statements
    }

    fn parse_error(text: &str) -> ConfigureError {
        stream_ninja_statements(Cursor::new(text), |_| {}).unwrap_err()
    }

    fn render(text: &str) -> String {
        parse(text)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_file_scope_assignment_keeps_inline_hash() {
        let statements = parse("# a leading comment\nfoo = not # a comment\n");
        assert_eq!(
            statements,
            vec![NinjaStatement::Assignment {
                name: "foo".to_string(),
                value: "not # a comment".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_input_has_no_statements() {
        assert!(parse("").is_empty());
        assert!(parse("# only comments\n\n  \n").is_empty());
    }

    #[test]
    fn test_rule_properties_round_trip() {
        let rendered = render(
            "rule cat\n  command = cat $in > $out\n\nrule date\n  command = date > $out\n\nbuild result: cat in_1.cc in-2.O\n",
        );
        assert_eq!(
            rendered,
            "rule cat\n  command = cat $in > $out\nrule date\n  command = date > $out\nbuild result : cat in_1.cc in-2.O"
        );
    }

    #[test]
    fn test_comments_and_blanks_inside_scope_do_not_close_it() {
        let statements = parse(
            "rule cat\n  command = a\n  # a comment between properties\n  \n  depfile = b\n",
        );
        assert_eq!(
            statements,
            vec![NinjaStatement::Rule {
                name: "cat".to_string(),
                properties: vec![
                    ("command".to_string(), "a".to_string()),
                    ("depfile".to_string(), "b".to_string()),
                ],
            }]
        );
    }

    #[test]
    fn test_trailing_text_after_rule_name_is_ignored() {
        let statements = parse("rule cat # My comment");
        assert_eq!(
            statements,
            vec![NinjaStatement::Rule {
                name: "cat".to_string(),
                properties: Vec::new(),
            }]
        );
    }

    #[test]
    fn test_build_sections_with_escaped_spaces() {
        let statements = parse("build a$ b|c$ d:ru$ le e$ f|g$ h||i$ j");
        assert_eq!(statements.len(), 1);
        let NinjaStatement::Build(build) = &statements[0] else {
            panic!("expected build, got {:?}", statements[0]);
        };
        assert_eq!(build.explicit_outputs, ["a$ b"]);
        assert_eq!(build.implicit_outputs, ["c$ d"]);
        assert_eq!(build.rule, "ru$ le");
        assert_eq!(build.explicit_inputs, ["e$ f"]);
        assert_eq!(build.implicit_inputs, ["g$ h"]);
        assert_eq!(build.order_only_inputs, ["i$ j"]);
    }

    #[test]
    fn test_escaped_dollars_and_colons_stay_verbatim() {
        let statements = parse("build a$$b:ru$$le c$$d");
        let NinjaStatement::Build(build) = &statements[0] else {
            panic!("expected build");
        };
        assert_eq!(build.explicit_outputs, ["a$$b"]);
        assert_eq!(build.rule, "ru$$le");
        assert_eq!(build.explicit_inputs, ["c$$d"]);

        assert_eq!(
            render("build build.ninja: RERUN_CMAKE C$:/abc"),
            "build build.ninja : RERUN_CMAKE C$:/abc"
        );
    }

    #[test]
    fn test_implicit_and_explicit_sections_render() {
        assert_eq!(
            render("build a | b : RULE c | d || e"),
            "build a | b : RULE c | d || e"
        );
    }

    #[test]
    fn test_line_continuation_joins_and_eats_indent() {
        let rendered = render(
            "build $\n  a: $\n    RULE $\n      b $\n\nbuild $\n  A: $\n    RULE $\n      B $\n      ",
        );
        assert_eq!(rendered, "build a : RULE b\nbuild A : RULE B");
    }

    #[test]
    fn test_escaped_dollar_runs_and_continuation_in_value() {
        let statements =
            parse("rule foo\n  command = ${out}bar$$baz$$$\nblah\nx = $$dollar\nbuild $x: foo y\n");
        assert_eq!(statements.len(), 3);
        let NinjaStatement::Rule { properties, .. } = &statements[0] else {
            panic!("expected rule");
        };
        assert_eq!(properties[0].1, "${out}bar$$baz$$blah");
        assert_eq!(
            statements[1],
            NinjaStatement::Assignment {
                name: "x".to_string(),
                value: "$$dollar".to_string(),
            }
        );
    }

    #[test]
    fn test_default_lists_every_target() {
        let statements = parse("default abc xyz");
        assert_eq!(
            statements,
            vec![NinjaStatement::Default {
                targets: vec!["abc".to_string(), "xyz".to_string()],
            }]
        );
    }

    #[test]
    fn test_include_and_subninja_round_trip() {
        assert_eq!(render("include rules.ninja"), "include rules.ninja");
        assert_eq!(render("subninja sub/build.ninja"), "subninja sub/build.ninja");
    }

    #[test]
    fn test_malformed_statements_report_the_line() {
        for text in ["build", "build:", "build | x : RULE", "[", "subninja a b"] {
            let error = parse_error(text);
            assert!(
                matches!(error, ConfigureError::NinjaSyntax { line: 1, .. }),
                "input {text:?} produced {error:?}"
            );
        }
        let error = parse_error("abc = ok\n  indented = bad\n");
        assert!(matches!(error, ConfigureError::NinjaSyntax { line: 2, .. }));
    }

    #[test]
    fn test_cmake_emitted_build_file() {
        let statements = parse(
            "# CMAKE generated file: DO NOT EDIT!\n\
             ninja_required_version = 1.5\n\
             \n\
             #############################################\n\
             # Include rules file.\n\
             \n\
             include rules.ninja\n\
             \n\
             build CMakeFiles/edit_cache.util: CUSTOM_COMMAND\n  \
               COMMAND = cmd.exe /C \"echo No interactive CMake dialog available.\"\n  \
               restat = 1\n\
             build edit_cache: phony CMakeFiles/edit_cache.util\n\
             default edit_cache\n",
        );
        assert_eq!(statements.len(), 5);
        assert_eq!(
            statements[0],
            NinjaStatement::Assignment {
                name: "ninja_required_version".to_string(),
                value: "1.5".to_string(),
            }
        );
        assert_eq!(
            statements[1],
            NinjaStatement::Include {
                file: "rules.ninja".to_string(),
            }
        );
        let NinjaStatement::Build(custom) = &statements[2] else {
            panic!("expected build");
        };
        assert_eq!(custom.rule, "CUSTOM_COMMAND");
        assert_eq!(
            custom.properties,
            vec![
                (
                    "COMMAND".to_string(),
                    "cmd.exe /C \"echo No interactive CMake dialog available.\"".to_string()
                ),
                ("restat".to_string(), "1".to_string()),
            ]
        );
        let NinjaStatement::Build(phony) = &statements[3] else {
            panic!("expected build");
        };
        assert_eq!(phony.rule, "phony");
        assert_eq!(phony.explicit_inputs, ["CMakeFiles/edit_cache.util"]);
    }
}
