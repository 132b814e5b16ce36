//! Typed CMake and ndk-build command line arguments.
//!
//! The host hands over argument vectors (or whole command strings) destined
//! for CMake or ndk-build. Parsing classifies each argument into a closed
//! set of variants while keeping the original text, so unknown future flags
//! survive a parse/serialize round trip untouched. Classification never
//! fails: malformed arguments degrade to [`CommandLineArgument::UnknownArgument`].

use std::collections::HashSet;

pub mod tokenize;

pub use tokenize::{PlatformConventions, tokenize_command_line};

/// One classified command line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLineArgument {
    /// `-DNAME=VALUE` (CMake) or `NAME=VALUE` (ndk-build).
    DefineProperty {
        source: String,
        name: String,
        value: String,
    },
    /// `-H<path>`: folder holding the root CMakeLists.txt.
    ListsPath { source: String, path: String },
    /// `-B<path>`: folder receiving the generated build system.
    BinaryOutputPath { source: String, path: String },
    /// `-G<name>`: the CMake generator.
    GeneratorName { source: String, name: String },
    /// `NAME+=VALUE`, ndk-build only. Cumulative, never subsumed.
    AppendProperty {
        source: String,
        list_name: String,
        value: String,
    },
    /// `-jN`, `-j N`, `--jobs=N` or `--jobs N`, ndk-build only.
    JobsCount { source: String, count: u32 },
    /// Anything unrecognized, preserved verbatim.
    UnknownArgument { source: String },
}

impl CommandLineArgument {
    /// The argument text as it appeared on the command line.
    pub fn source(&self) -> &str {
        match self {
            CommandLineArgument::DefineProperty { source, .. }
            | CommandLineArgument::ListsPath { source, .. }
            | CommandLineArgument::BinaryOutputPath { source, .. }
            | CommandLineArgument::GeneratorName { source, .. }
            | CommandLineArgument::AppendProperty { source, .. }
            | CommandLineArgument::JobsCount { source, .. }
            | CommandLineArgument::UnknownArgument { source } => source,
        }
    }

    /// Canonical re-serialization. Values are quoted only when they contain
    /// whitespace; unknown arguments come back verbatim.
    pub fn to_argument(&self) -> String {
        match self {
            CommandLineArgument::DefineProperty {
                source,
                name,
                value,
            } => {
                // ndk-build defines carry no -D prefix
                if source.starts_with("-D") {
                    format!("-D{name}={}", quote_if_needed(value))
                } else {
                    format!("{name}={}", quote_if_needed(value))
                }
            }
            CommandLineArgument::ListsPath { path, .. } => {
                format!("-H{}", quote_if_needed(path))
            }
            CommandLineArgument::BinaryOutputPath { path, .. } => {
                format!("-B{}", quote_if_needed(path))
            }
            CommandLineArgument::GeneratorName { name, .. } => {
                format!("-G{}", quote_if_needed(name))
            }
            CommandLineArgument::AppendProperty {
                list_name, value, ..
            } => {
                format!("{list_name}+={}", quote_if_needed(value))
            }
            CommandLineArgument::JobsCount { count, .. } => format!("-j{count}"),
            CommandLineArgument::UnknownArgument { source } => source.clone(),
        }
    }
}

/// Flags whose value may follow as a separate token. Only these exact
/// single-dash, single-letter flags combine; two-dash and unknown flags
/// never do.
const CMAKE_COMBINABLE_FLAGS: [&str; 5] = ["-D", "-G", "-H", "-B", "-C"];

/// Classify a CMake argument vector.
pub fn parse_cmake_arguments(args: &[String]) -> Vec<CommandLineArgument> {
    let mut result = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let token = &args[i];
        // An empty next token never combines; a bare flag followed by ""
        // must reparse to the same two tokens it serializes to
        let (combined, source) = if CMAKE_COMBINABLE_FLAGS.contains(&token.as_str())
            && i + 1 < args.len()
            && !args[i + 1].is_empty()
        {
                i += 1;
                (format!("{token}{}", args[i]), format!("{token} {}", args[i]))
            } else {
                (token.clone(), token.clone())
            };
        result.push(classify_cmake_argument(&combined, source));
        i += 1;
    }
    result
}

/// Tokenize a whole CMake command string, then classify.
pub fn parse_cmake_command_line(
    command: &str,
    conventions: PlatformConventions,
) -> Vec<CommandLineArgument> {
    parse_cmake_arguments(&tokenize_command_line(command, conventions))
}

fn classify_cmake_argument(token: &str, source: String) -> CommandLineArgument {
    if let Some(rest) = token.strip_prefix("-D") {
        if let Some((name, value)) = rest.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                return CommandLineArgument::DefineProperty {
                    source,
                    name: name.to_string(),
                    value: unquote(value),
                };
            }
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    if let Some(rest) = token.strip_prefix("-H") {
        if !rest.is_empty() {
            return CommandLineArgument::ListsPath {
                source,
                path: unquote(rest),
            };
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    if let Some(rest) = token.strip_prefix("-B") {
        if !rest.is_empty() {
            return CommandLineArgument::BinaryOutputPath {
                source,
                path: unquote(rest),
            };
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    if let Some(rest) = token.strip_prefix("-G") {
        if !rest.is_empty() {
            return CommandLineArgument::GeneratorName {
                source,
                name: unquote(rest),
            };
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    CommandLineArgument::UnknownArgument { source }
}

/// Classify an ndk-build argument vector.
pub fn parse_ndk_build_arguments(args: &[String]) -> Vec<CommandLineArgument> {
    let mut result = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let token = &args[i];
        if (token == "--jobs" || token == "-j")
            && i + 1 < args.len()
            && args[i + 1].parse::<u32>().is_ok()
        {
            let source = format!("{token} {}", args[i + 1]);
            result.push(jobs_argument(&args[i + 1], source));
            i += 2;
            continue;
        }
        result.push(classify_ndk_build_argument(token));
        i += 1;
    }
    result
}

/// Tokenize a whole ndk-build command string, then classify.
pub fn parse_ndk_build_command_line(
    command: &str,
    conventions: PlatformConventions,
) -> Vec<CommandLineArgument> {
    parse_ndk_build_arguments(&tokenize_command_line(command, conventions))
}

fn classify_ndk_build_argument(token: &str) -> CommandLineArgument {
    let source = token.to_string();
    if let Some(count) = token.strip_prefix("--jobs=") {
        return jobs_argument(count, source);
    }
    if let Some(count) = token.strip_prefix("-j") {
        if !count.is_empty() {
            return jobs_argument(count, source);
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    if token.starts_with('-') {
        return CommandLineArgument::UnknownArgument { source };
    }
    if let Some((name, value)) = token.split_once("+=") {
        let name = name.trim();
        if !name.is_empty() {
            return CommandLineArgument::AppendProperty {
                source,
                list_name: name.to_string(),
                value: unquote(value),
            };
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    if let Some((name, value)) = token.split_once('=') {
        let name = name.trim();
        if !name.is_empty() {
            return CommandLineArgument::DefineProperty {
                source,
                name: name.to_string(),
                value: unquote(value),
            };
        }
        return CommandLineArgument::UnknownArgument { source };
    }
    CommandLineArgument::UnknownArgument { source }
}

fn jobs_argument(count_text: &str, source: String) -> CommandLineArgument {
    match count_text.parse::<u32>() {
        Ok(count) => CommandLineArgument::JobsCount { source, count },
        Err(_) => CommandLineArgument::UnknownArgument { source },
    }
}

/// Keep only the last occurrence of each define name and of the generator
/// flag, matching CMake's own last-wins behavior. Append properties are
/// cumulative and always kept.
pub fn remove_subsumed_arguments(args: Vec<CommandLineArgument>) -> Vec<CommandLineArgument> {
    let mut seen_defines = HashSet::new();
    let mut seen_generator = false;
    let mut kept: Vec<CommandLineArgument> = Vec::with_capacity(args.len());
    for argument in args.into_iter().rev() {
        let keep = match &argument {
            CommandLineArgument::DefineProperty { name, .. } => seen_defines.insert(name.clone()),
            CommandLineArgument::GeneratorName { .. } => {
                !std::mem::replace(&mut seen_generator, true)
            }
            _ => true,
        };
        if keep {
            kept.push(argument);
        }
    }
    kept.reverse();
    kept
}

/// Drop define properties whose value is empty after unquoting.
pub fn remove_blank_properties(args: Vec<CommandLineArgument>) -> Vec<CommandLineArgument> {
    args.into_iter()
        .filter(|argument| {
            !matches!(
                argument,
                CommandLineArgument::DefineProperty { value, .. } if value.is_empty()
            )
        })
        .collect()
}

/// Canonical string form of an argument list.
pub fn to_string_list(args: &[CommandLineArgument]) -> Vec<String> {
    args.iter().map(CommandLineArgument::to_argument).collect()
}

/// Strip surrounding double quotes, but only the kind
/// [`quote_if_needed`] adds back: quotes around whitespace or around
/// nothing. Stripping any other quote pair would make re-serialization
/// drift instead of reaching a fixed point.
fn unquote(text: &str) -> String {
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        let inner = &text[1..text.len() - 1];
        if inner.is_empty() || inner.chars().any(char::is_whitespace) {
            return inner.to_string();
        }
    }
    text.to_string()
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}
