//! Command line tokenization with host quoting conventions.
//!
//! CMake writes `compile_commands.json` entries with a single `command`
//! string, and DSL users hand over whole argument strings; both need to be
//! split into tokens before classification. POSIX shells and the Windows
//! C runtime disagree about quotes and backslashes, so the caller states
//! which convention produced the string.

/// Quoting and escaping conventions of the host that produced a command
/// line string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformConventions {
    Posix,
    Windows,
}

/// Split a full command line string into tokens.
///
/// Never fails: malformed input (unterminated quotes, trailing escapes)
/// degrades to taking the remaining text literally.
pub fn tokenize_command_line(command: &str, conventions: PlatformConventions) -> Vec<String> {
    match conventions {
        PlatformConventions::Posix => tokenize_posix(command),
        PlatformConventions::Windows => tokenize_windows(command),
    }
}

fn tokenize_posix(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            '\\' => {
                started = true;
                // Trailing escape is dropped
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '\'' => {
                started = true;
                for inner in chars.by_ref() {
                    if inner == '\'' {
                        break;
                    }
                    current.push(inner);
                }
            }
            '"' => {
                started = true;
                while let Some(inner) = chars.next() {
                    match inner {
                        '"' => break,
                        '\\' => match chars.next() {
                            // Inside double quotes, backslash only escapes
                            // the characters special to the shell
                            Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                            Some(next) => {
                                current.push('\\');
                                current.push(next);
                            }
                            None => current.push('\\'),
                        },
                        other => current.push(other),
                    }
                }
            }
            other => {
                started = true;
                current.push(other);
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

fn tokenize_windows(command: &str) -> Vec<String> {
    let chars: Vec<char> = command.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut started = false;
    let mut in_quotes = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            // Count the backslash run; it only has escape meaning when it
            // ends at a double quote
            let mut backslashes = 0;
            while i < chars.len() && chars[i] == '\\' {
                backslashes += 1;
                i += 1;
            }
            started = true;
            if i < chars.len() && chars[i] == '"' {
                for _ in 0..backslashes / 2 {
                    current.push('\\');
                }
                if backslashes % 2 == 1 {
                    current.push('"');
                    i += 1;
                } else {
                    in_quotes = !in_quotes;
                    i += 1;
                }
            } else {
                for _ in 0..backslashes {
                    current.push('\\');
                }
            }
        } else if c == '"' {
            started = true;
            in_quotes = !in_quotes;
            i += 1;
        } else if !in_quotes && (c == ' ' || c == '\t') {
            if started {
                tokens.push(std::mem::take(&mut current));
                started = false;
            }
            i += 1;
        } else {
            started = true;
            current.push(c);
            i += 1;
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}
