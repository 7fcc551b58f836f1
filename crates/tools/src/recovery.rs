//! Recovery Tables
//!
//! Planners writing LaTeX inside JSON routinely get the escaping wrong. The
//! repairs live in two ordered tables of named rules:
//!
//! - [`JSON_RULES`] run on a candidate object that failed to decode. If none
//!   applies, or the repaired text still does not decode, parsing fails.
//! - [`CONTENT_RULES`] run on decoded `content` parameters of write
//!   operations. Each one fires only on evidence of the mistake it repairs,
//!   so correctly escaped content passes through untouched.
//!
//! Every rule is best effort. A rule reduces a known failure class; it does
//! not guarantee the result is valid LaTeX.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Name of the JSON rule that doubles backslashes JSON does not accept.
pub const INVALID_ESCAPES: &str = "invalid_escape_sequences";

/// What decoding revealed about how the planner escaped its output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscapeEvidence {
    /// Commands were written with a single backslash and the JSON only
    /// decoded after [`INVALID_ESCAPES`] ran. Commands whose first letter is
    /// a JSON escape (`\b`, `\f`, `\n`, `\r`, `\t`) came out as control
    /// characters.
    pub single_backslash_commands: bool,
}

impl EscapeEvidence {
    /// Evidence left by the JSON rules that fired on a candidate.
    pub fn from_json_repairs(applied: &[&str]) -> Self {
        Self {
            single_backslash_commands: applied.contains(&INVALID_ESCAPES),
        }
    }
}

/// A named text repair. `apply` returns `None` when the rule does not fire.
pub struct RecoveryRule {
    pub name: &'static str,
    pub apply: fn(&str, EscapeEvidence) -> Option<String>,
}

/// Repairs applied to undecodable operation JSON, in order.
pub const JSON_RULES: &[RecoveryRule] = &[
    RecoveryRule {
        name: "raw_control_chars_in_strings",
        apply: escape_raw_control_chars,
    },
    RecoveryRule {
        name: INVALID_ESCAPES,
        apply: double_invalid_escapes,
    },
    RecoveryRule {
        name: "trailing_commas",
        apply: strip_trailing_commas,
    },
];

/// Repairs applied to decoded document content, in order.
pub const CONTENT_RULES: &[RecoveryRule] = &[
    RecoveryRule {
        name: "control_char_swallowed_command",
        apply: restore_swallowed_commands,
    },
    RecoveryRule {
        name: "doubled_command_backslash",
        apply: collapse_doubled_command_backslashes,
    },
    RecoveryRule {
        name: "literal_newline_escapes",
        apply: expand_literal_newlines,
    },
];

/// Outcome of running a rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub text: String,
    /// Names of the rules that fired, in order
    pub applied: Vec<&'static str>,
}

/// Run every rule of `table` over `input`, feeding each rule the previous
/// rule's output.
pub fn apply_rules(table: &[RecoveryRule], input: &str, evidence: EscapeEvidence) -> Recovered {
    let mut text = input.to_string();
    let mut applied = Vec::new();
    for rule in table {
        if let Some(fixed) = (rule.apply)(&text, evidence) {
            if fixed != text {
                text = fixed;
                applied.push(rule.name);
            }
        }
    }
    Recovered { text, applied }
}

/// Repair undecodable JSON. `None` when no rule applies or the repaired
/// text still fails to decode.
pub fn repair_json(candidate: &str) -> Option<(serde_json::Value, Vec<&'static str>)> {
    let recovered = apply_rules(JSON_RULES, candidate, EscapeEvidence::default());
    if recovered.applied.is_empty() {
        return None;
    }
    serde_json::from_str(&recovered.text)
        .ok()
        .map(|value| (value, recovered.applied))
}

// ---------------------------------------------------------------------------
// JSON-level rules
// ---------------------------------------------------------------------------

/// Walk `input` calling `on_string_char` for each character inside a JSON
/// string (the opening and closing quotes excluded) and copying the rest.
/// A backslash is passed together with the character it escapes.
fn rewrite_strings(
    input: &str,
    mut on_string_char: impl FnMut(&mut String, char, Option<char>),
) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut chars = input.chars();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => {
                let next = chars.next();
                on_string_char(&mut out, c, next);
            }
            _ => on_string_char(&mut out, c, None),
        }
    }
    out
}

fn escape_raw_control_chars(input: &str, _: EscapeEvidence) -> Option<String> {
    let out = rewrite_strings(input, |out, c, next| match (c, next) {
        ('\\', Some(n)) => {
            out.push('\\');
            out.push(n);
        }
        ('\\', None) => out.push('\\'),
        ('\n', _) => out.push_str("\\n"),
        ('\r', _) => out.push_str("\\r"),
        ('\t', _) => out.push_str("\\t"),
        (c, _) if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
        (c, _) => out.push(c),
    });
    (out != input).then_some(out)
}

fn is_hex4(s: &str) -> bool {
    s.len() >= 4 && s.chars().take(4).all(|c| c.is_ascii_hexdigit())
}

fn double_invalid_escapes(input: &str, _: EscapeEvidence) -> Option<String> {
    // Needs lookahead for \uXXXX, so scan by byte offset instead of using
    // the generic string walker.
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut iter = input.char_indices().peekable();

    while let Some((idx, c)) = iter.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => match iter.peek().map(|(_, n)| *n) {
                Some(n @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't')) => {
                    out.push('\\');
                    out.push(n);
                    iter.next();
                }
                Some('u') if is_hex4(&input[idx + 2..]) => {
                    out.push_str("\\u");
                    iter.next();
                }
                _ => out.push_str("\\\\"),
            },
            _ => out.push(c),
        }
    }
    (out != input).then_some(out)
}

fn strip_trailing_commas(input: &str, _: EscapeEvidence) -> Option<String> {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    (out != input).then_some(out)
}

// ---------------------------------------------------------------------------
// Content-level rules
// ---------------------------------------------------------------------------

/// Commands whose first letter doubles as a JSON escape. Written as
/// `"\begin"`, the `\b` decodes to a backspace and the command loses its
/// first letter.
struct SwallowedCommands {
    control: char,
    letter: char,
    suffixes: &'static str,
    /// The control character followed by one of these suffixes also occurs
    /// in ordinary text
    needs_evidence: bool,
}

const SWALLOWED_COMMANDS: &[SwallowedCommands] = &[
    SwallowedCommands {
        control: '\u{8}',
        letter: 'b',
        suffixes: "egin|ibitem|ibliography|ibliographystyle|oldsymbol|igskip|ackslash|ullet|ottom|eta|ar|f",
        needs_evidence: false,
    },
    SwallowedCommands {
        control: '\u{c}',
        letter: 'f',
        suffixes: "rac|ootnotesize|ootnote|igure|box|orall|lat",
        needs_evidence: false,
    },
    SwallowedCommands {
        control: '\t',
        letter: 't',
        suffixes: "extbf|extit|exttt|extrm|extsc|extsf|extwidth|ableofcontents|abular",
        needs_evidence: false,
    },
    SwallowedCommands {
        control: '\t',
        letter: 't',
        suffixes: "ext|able|itle|iny|imes|heta|ilde|hanks|oday|riangle",
        needs_evidence: true,
    },
    SwallowedCommands {
        control: '\r',
        letter: 'r',
        suffixes: "enewcommand|ightarrow|aggedright|aggedleft",
        needs_evidence: false,
    },
    SwallowedCommands {
        control: '\r',
        letter: 'r',
        suffixes: "ight|ule|angle|oman|ef|ho|m",
        needs_evidence: true,
    },
    SwallowedCommands {
        control: '\n',
        letter: 'n',
        suffixes: "ewcommand|ewenvironment|ewpage|ewline|oindent|ormalsize|ocite|umberwithin|onumber",
        needs_evidence: false,
    },
    SwallowedCommands {
        control: '\n',
        letter: 'n',
        suffixes: "abla|eq",
        needs_evidence: true,
    },
];

fn swallowed_command_patterns() -> &'static [(&'static SwallowedCommands, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static SwallowedCommands, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SWALLOWED_COMMANDS
            .iter()
            .filter_map(|entry| {
                let pattern = format!(
                    r"{}({})\b",
                    regex::escape(&entry.control.to_string()),
                    entry.suffixes
                );
                Regex::new(&pattern).ok().map(|re| (entry, re))
            })
            .collect()
    })
}

fn restore_swallowed_commands(input: &str, evidence: EscapeEvidence) -> Option<String> {
    // Backspace and form feed never belong in a document.
    let trusted = evidence.single_backslash_commands
        || input.contains(|c: char| c == '\u{8}' || c == '\u{c}');

    let mut text = input.to_string();
    for (entry, re) in swallowed_command_patterns() {
        if entry.needs_evidence && !trusted {
            continue;
        }
        if re.is_match(&text) {
            let replacement = format!("\\{}${{1}}", entry.letter);
            text = re.replace_all(&text, replacement.as_str()).into_owned();
        }
    }
    (text != input).then_some(text)
}

const DOUBLED_COMMANDS: &str = "begin|end|documentclass|usepackage|section|subsection|subsubsection|chapter|paragraph|textbf|textit|emph|cite|ref|label|item|includegraphics|caption|centering|frac|maketitle|title|author|date|input|include|hline|footnote|url|href";

fn doubled_backslash_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(&format!(r"(\\+)({})\b", DOUBLED_COMMANDS)).ok())
        .as_ref()
}

/// Collapse `\\section` to `\section`. Only a run of exactly two
/// backslashes is a doubled command; `\\\hline` is a line break followed by
/// `\hline` and stays as written.
fn collapse_doubled_command_backslashes(input: &str, _: EscapeEvidence) -> Option<String> {
    let re = doubled_backslash_pattern()?;
    let out = re
        .replace_all(input, |caps: &Captures| {
            if caps[1].len() == 2 {
                format!("\\{}", &caps[2])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();
    (out != input).then_some(out)
}

/// LaTeX commands starting with `n`; a literal `\n` in front of these is a
/// command, not an escaped newline.
const N_COMMANDS: &[&str] = &[
    "newcommand",
    "newenvironment",
    "newpage",
    "newline",
    "newtheorem",
    "newcounter",
    "newlength",
    "newblock",
    "newif",
    "noindent",
    "nobreak",
    "nolinebreak",
    "nopagebreak",
    "nolimits",
    "normalsize",
    "normalfont",
    "nocite",
    "nonumber",
    "notag",
    "numberwithin",
    "numberline",
    "nabla",
    "nexists",
    "neq",
    "node",
    "not",
    "ni",
    "nu",
];

/// Byte offsets of `\n` pairs whose backslash is not itself escaped.
fn literal_newline_offsets(input: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut run = 0usize;
    for (i, &b) in input.as_bytes().iter().enumerate() {
        if b == b'\\' {
            run += 1;
            continue;
        }
        if b == b'n' && run % 2 == 1 {
            offsets.push(i - 1);
        }
        run = 0;
    }
    offsets
}

fn starts_n_command(after_backslash: &str) -> bool {
    N_COMMANDS.iter().any(|cmd| {
        after_backslash.starts_with(cmd)
            && !after_backslash[cmd.len()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
    })
}

/// Expand `\n` escapes in content that was flattened onto one line.
///
/// Fires only when the content has no real line break, carries at least two
/// `\n` escapes, and at least one of them cannot start a command (it is
/// followed by another backslash, a space, punctuation or the end).
fn expand_literal_newlines(input: &str, _: EscapeEvidence) -> Option<String> {
    if input.contains('\n') {
        return None;
    }
    let offsets = literal_newline_offsets(input);
    let unambiguous = offsets
        .iter()
        .any(|&at| !input[at + 2..].starts_with(|c: char| c.is_ascii_alphabetic()));
    if offsets.len() < 2 || !unambiguous {
        return None;
    }

    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for at in offsets {
        if starts_n_command(&input[at + 1..]) {
            continue;
        }
        out.push_str(&input[last..at]);
        out.push('\n');
        last = at + 2;
    }
    out.push_str(&input[last..]);
    (out != input).then_some(out)
}
