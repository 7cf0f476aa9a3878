//! Inline-constrained path patterns.
//!
//! Declared paths use `{name:regex}` parameters, possibly embedded inside a
//! segment (`school-term-{school_term:[1-9][0-9]*}`). Axum captures whole
//! segments only and has no regex constraints, so every segment holding a
//! parameter is registered as a positional capture (`{p0}`, `{p1}`, ...) and
//! the decoded capture is then checked against an anchored regex built from
//! the declaration.

use {
    crate::{Error, Result},
    regex::Regex,
    std::{collections::BTreeMap, fmt, sync::LazyLock},
};

const DEFAULT_PARAM_REGEX: &str = "[^/]+";

static PARAM_NAME_REGEXP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("parameter name pattern is valid")
});

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param {
        capture: String,
        regex: Regex,
        names: Vec<String>,
    },
}

/// A compiled declared path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    declared: String,
    axum_path: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

/// Splits a path on `/` outside of `{...}` groups.
fn split_segments(path: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::config(format!("unbalanced '}}' in route '{path}'"))
                })?;
            }
            '/' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::config(format!("unbalanced '{{' in route '{path}'")));
    }
    segments.push(&path[start..]);
    Ok(segments.into_iter().filter(|s| !s.is_empty()).collect())
}

/// Builds the anchored regex for one segment, returning it with the
/// parameter names it captures, or `None` for a literal segment.
fn segment_regex(path: &str, segment: &str) -> Result<Option<(String, Vec<String>)>> {
    if !segment.contains('{') {
        return Ok(None);
    }

    let mut pattern = String::from("^");
    let mut names = Vec::new();
    let mut literal = String::new();
    let mut chars = segment.char_indices();

    while let Some((i, c)) = chars.next() {
        if c != '{' {
            literal.push(c);
            continue;
        }
        pattern.push_str(&regex::escape(&literal));
        literal.clear();

        let mut depth = 1usize;
        let mut end = i + 1;
        for (j, c) in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                end = j;
                break;
            }
        }

        let body = &segment[i + 1..end];
        let (name, regex) = match body.split_once(':') {
            Some((name, regex)) => (name.trim(), regex),
            None => (body.trim(), DEFAULT_PARAM_REGEX),
        };
        if !PARAM_NAME_REGEXP.is_match(name) {
            return Err(Error::config(format!(
                "invalid parameter name '{name}' in route '{path}'"
            )));
        }
        if regex.is_empty() {
            return Err(Error::config(format!(
                "parameter '{name}' in route '{path}' has an empty pattern"
            )));
        }
        pattern.push_str(&format!("(?P<{name}>{regex})"));
        names.push(name.to_string());
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');

    Ok(Some((pattern, names)))
}

impl PathPattern {
    /// Compiles a flattened path. Invalid parameter regexes, malformed
    /// braces and repeated parameter names are configuration errors.
    pub fn compile(path: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut axum_segments = Vec::new();
        let mut all_names: Vec<String> = Vec::new();

        for segment in split_segments(path)? {
            match segment_regex(path, segment)? {
                None => {
                    if segment.starts_with(':') || segment.starts_with('*') || segment.contains('}')
                    {
                        return Err(Error::config(format!(
                            "segment '{segment}' of route '{path}' cannot be registered"
                        )));
                    }
                    axum_segments.push(segment.to_string());
                    segments.push(Segment::Literal(segment.to_string()));
                }
                Some((pattern, names)) => {
                    if let Some(dup) = names.iter().find(|n| all_names.contains(n)) {
                        return Err(Error::config(format!(
                            "parameter '{dup}' appears twice in route '{path}'"
                        )));
                    }
                    all_names.extend(names.iter().cloned());

                    let regex = Regex::new(&pattern).map_err(|e| {
                        Error::config(format!("invalid pattern in route '{path}': {e}"))
                    })?;
                    let capture = format!("p{}", axum_segments.len());
                    axum_segments.push(format!("{{{capture}}}"));
                    segments.push(Segment::Param {
                        capture,
                        regex,
                        names,
                    });
                }
            }
        }

        let trailing_slash = has_trailing_slash(path) && !axum_segments.is_empty();
        let mut axum_path = format!("/{}", axum_segments.join("/"));
        if trailing_slash {
            axum_path.push('/');
        }

        Ok(Self {
            declared: path.to_string(),
            axum_path,
            segments,
            trailing_slash,
        })
    }

    /// The path as declared.
    pub fn declared(&self) -> &str {
        &self.declared
    }

    /// The path registered with axum.
    pub fn axum_path(&self) -> &str {
        &self.axum_path
    }

    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Param { .. }))
    }

    /// Checks axum's decoded segment captures against the declared
    /// constraints, returning the named parameters on success.
    pub fn match_captures<'a, I>(&self, captures: I) -> Option<BTreeMap<String, String>>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let captures: BTreeMap<&str, &str> = captures.into_iter().collect();
        let mut params = BTreeMap::new();

        for segment in &self.segments {
            let Segment::Param {
                capture,
                regex,
                names,
            } = segment
            else {
                continue;
            };
            let value = captures.get(capture.as_str())?;
            let caps = regex.captures(value)?;
            for name in names {
                let matched = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
                params.insert(name.clone(), matched.to_string());
            }
        }

        Some(params)
    }

    /// Matches a full request path directly, without going through axum.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        if has_trailing_slash(path) != self.trailing_slash {
            return None;
        }
        let parts = split_segments(path).ok()?;
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal != part => return None,
                Segment::Literal(_) => {}
                Segment::Param { capture, .. } => captures.push((capture.as_str(), *part)),
            }
        }
        self.match_captures(captures)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.declared)
    }
}
