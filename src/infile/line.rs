const CONSTRAINT_MARKER: &str = "-c ";
const REQUIREMENT_MARKER: &str = "-r ";

/// One classified line of a requirements `.in` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// Blank or a comment.
    Ignorable,
    /// `-c` or `-r` reference to another requirements file. Relative to the
    /// folder containing the file the line was read from.
    Include(&'a str),
    /// Anything else, kept verbatim apart from an inline comment.
    Requirement(&'a str),
}

/// Strips an inline comment, everything from the first `#`, and trailing whitespace.
pub fn strip_inline_comment(val: &str) -> &str {
    match val.find('#') {
        Some(pos) => val[..pos].trim_end(),
        None => val,
    }
}

pub fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return Line::Ignorable;
    }

    // -c and -r are treated as equivalents
    let include = line
        .strip_prefix(CONSTRAINT_MARKER)
        .or_else(|| line.strip_prefix(REQUIREMENT_MARKER));
    match include {
        Some(rest) => match strip_inline_comment(rest).trim() {
            "" => Line::Ignorable,
            target => Line::Include(target),
        },
        None => Line::Requirement(strip_inline_comment(line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn blank_and_comments() {
        assert_eq!(parse_line(""), Line::Ignorable);
        assert_eq!(parse_line("   \t"), Line::Ignorable);
        assert_eq!(parse_line("# pip is pinned in pins.shared.in"), Line::Ignorable);
        assert_eq!(parse_line("    # indented comment"), Line::Ignorable);
    }

    #[test]
    fn constraint_and_requirement_directives() {
        assert_eq!(parse_line("-c pins.shared.in"), Line::Include("pins.shared.in"));
        assert_eq!(parse_line("-r ../base.in"), Line::Include("../base.in"));
        assert_eq!(
            parse_line("-r base.in  # shared between venvs"),
            Line::Include("base.in")
        );
        assert_eq!(parse_line("-c   # nothing"), Line::Ignorable);
    }

    #[test]
    fn literal_requirements() {
        assert_eq!(parse_line("requests"), Line::Requirement("requests"));
        assert_eq!(
            parse_line("Flask>=2.0,<3  # upper bound, see issue 12"),
            Line::Requirement("Flask>=2.0,<3")
        );
        assert_eq!(
            parse_line("typing-extensions; python_version<\"3.11\""),
            Line::Requirement("typing-extensions; python_version<\"3.11\"")
        );
        // unknown pip options are kept as requirements
        assert_eq!(
            parse_line("--index-url https://example.org/simple"),
            Line::Requirement("--index-url https://example.org/simple")
        );
    }

    #[test]
    fn strip_comment_keeps_text_without_hash() {
        assert_eq!(strip_inline_comment("pip>=24.2"), "pip>=24.2");
        assert_eq!(strip_inline_comment("pip>=24.2   #  why"), "pip>=24.2");
        assert_eq!(strip_inline_comment("#"), "");
    }
}
