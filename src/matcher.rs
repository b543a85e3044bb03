//! Client-side folder filtering by name pattern and mailbox attribute.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::error::Result;
use crate::types::normalize_flag;

lazy_static! {
    static ref MATCH_ALL: Regex = Regex::new("(?s)^.*$").unwrap();
}

/// Attributes of virtual or special-purpose folders that discovery skips unless asked otherwise.
pub const DEFAULT_EXCLUDED_FLAGS: &[&str] = &[
    "Noselect", "All", "Drafts", "Important", "Junk", "Spam", "Flagged", "Trash",
];

/// A folder name pattern: a case-insensitive glob or a regular expression.
#[derive(Clone, Debug)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// A shell-style glob matched case-insensitively against the whole name.
    ///
    /// `*` matches any run of characters (including the hierarchy delimiter), `?` matches one
    /// character, and `[...]` / `[!...]` match a character class.
    pub fn glob(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(&glob_to_regex(pattern))
            .case_insensitive(true)
            .build()?;
        Ok(NamePattern {
            source: pattern.to_string(),
            regex,
        })
    }

    /// A regular expression, matched anywhere in the name unless anchored.
    ///
    /// Unlike [`glob`](Self::glob), matching is case-sensitive; prefix the pattern with `(?i)`
    /// to ignore case.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(NamePattern {
            source: pattern.to_string(),
            regex: Regex::new(pattern)?,
        })
    }

    /// The pattern as it was given.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns true if `name` matches this pattern.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl From<Regex> for NamePattern {
    fn from(regex: Regex) -> Self {
        NamePattern {
            source: regex.as_str().to_string(),
            regex,
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut re = String::from("(?s)^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let negated = chars.peek() == Some(&'!');
                if negated {
                    chars.next();
                }
                let mut members = Vec::new();
                // a `]` right after the opening bracket is a member, not the end
                if chars.peek() == Some(&']') {
                    chars.next();
                    members.push(']');
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    members.push(c);
                }
                if closed {
                    push_class(&mut re, &members, negated);
                } else {
                    // an unterminated class is literal text
                    let text: String = members.into_iter().collect();
                    re.push_str(&regex::escape(if negated { "[!" } else { "[" }));
                    re.push_str(&regex::escape(&text));
                }
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    re
}

fn push_class(re: &mut String, members: &[char], negated: bool) {
    re.push_str(if negated { "[^" } else { "[" });
    let mut i = 0;
    while i < members.len() {
        if i + 2 < members.len() && members[i + 1] == '-' {
            push_class_member(re, members[i]);
            re.push('-');
            push_class_member(re, members[i + 2]);
            i += 3;
        } else {
            push_class_member(re, members[i]);
            i += 1;
        }
    }
    re.push(']');
}

/// Escape everything the regex class syntax would read as an operator (`--`, `&&`, `~~`, ...).
fn push_class_member(re: &mut String, c: char) {
    if matches!(c, '\\' | '[' | ']' | '-' | '^' | '&' | '~') {
        re.push('\\');
    }
    re.push(c);
}

/// Include/exclude rules over folder names and attributes.
///
/// A folder is excluded if it matches any exclude pattern or carries any exclude flag. Otherwise
/// it is included if it matches any include pattern or carries any include flag. Exclusion
/// always wins.
///
/// The default filter includes every name and excludes [`DEFAULT_EXCLUDED_FLAGS`].
#[derive(Clone, Debug)]
pub struct FolderFilter {
    /// Name patterns that admit a folder.
    pub include: Vec<NamePattern>,
    /// Name patterns that reject a folder.
    pub exclude: Vec<NamePattern>,
    /// Attributes that admit a folder.
    pub include_flags: Vec<String>,
    /// Attributes that reject a folder.
    pub exclude_flags: Vec<String>,
}

impl Default for FolderFilter {
    fn default() -> Self {
        FolderFilter {
            include: vec![NamePattern::from(MATCH_ALL.clone())],
            exclude: Vec::new(),
            include_flags: Vec::new(),
            exclude_flags: DEFAULT_EXCLUDED_FLAGS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl FolderFilter {
    /// A filter that admits nothing until include rules are added and excludes nothing.
    pub fn empty() -> Self {
        FolderFilter {
            include: Vec::new(),
            exclude: Vec::new(),
            include_flags: Vec::new(),
            exclude_flags: Vec::new(),
        }
    }

    /// Decide whether a folder with the given decoded `name` and `attributes` is wanted.
    pub fn matches<S: AsRef<str>>(&self, name: &str, attributes: &[S]) -> bool {
        if self.exclude.iter().any(|p| p.is_match(name)) || has_any(attributes, &self.exclude_flags)
        {
            return false;
        }
        self.include.iter().any(|p| p.is_match(name)) || has_any(attributes, &self.include_flags)
    }
}

fn has_any<S: AsRef<str>>(attributes: &[S], flags: &[String]) -> bool {
    if flags.is_empty() {
        return false;
    }
    attributes.iter().any(|attribute| {
        let attribute = normalize_flag(attribute.as_ref());
        flags.iter().any(|flag| normalize_flag(flag) == attribute)
    })
}
